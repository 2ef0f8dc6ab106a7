//! Replay injection scenario: a recorded authenticated frame, re-delivered
//! after the session has advanced, must engage E-STOP and stop processing.

use std::time::Duration;

use tetherlink_core::Environment;
use tetherlink_core::constants::ESTOP_CLEAR_CONFIRM;
use tetherlink_harness::{RobotSlot, handles, serve_robot, sim_psk};
use tetherlink_proto::{ControlCommand, FrameSender, io::write_frame};

#[test]
fn recorded_frame_injection_engages_estop() {
    let mut sim = turmoil::Builder::new().build();
    let slot = RobotSlot::default();

    let host_slot = slot.clone();
    sim.host("robot", move || serve_robot(host_slot.clone(), 5001));

    sim.client("attacker_in_the_middle", async move {
        let mut stream = turmoil::net::TcpStream::connect("robot:5001").await?;
        let sender = FrameSender::new(sim_psk());

        // Legitimate session: release, then one clamp command. The clamp
        // frame is "recorded off the wire".
        let release = ControlCommand::EmergencyStop {
            engage: false,
            confirm: Some(ESTOP_CLEAR_CONFIRM.to_string()),
            reason: None,
        };
        write_frame(&mut stream, &sender.build(release.encode()?)?).await?;

        let recorded = sender.build(ControlCommand::ClampClose.encode()?)?;
        write_frame(&mut stream, &recorded).await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let robot = handles(&slot).expect("robot booted");
        assert_eq!(robot.actuator.applied(), vec![ControlCommand::ClampClose]);

        // Inject the recorded frame again, followed by a command that must
        // never execute.
        write_frame(&mut stream, &recorded).await?;
        write_frame(&mut stream, &sender.build(ControlCommand::ClampOpen.encode()?)?).await?;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = robot.safety.snapshot(robot.env.now());
        assert!(snapshot.engaged, "replay must engage estop");
        assert_eq!(snapshot.reason, "auth_failure");
        assert_eq!(
            robot.actuator.applied(),
            vec![ControlCommand::ClampClose],
            "nothing after the replayed frame may execute"
        );

        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn reconnecting_imposter_cannot_reuse_a_recorded_frame_stream() {
    // A fresh connection legitimately restarts sequence numbers from zero;
    // what it cannot do is skip the release guards. The recorded clamp
    // frame replays "successfully" at the frame layer on a fresh
    // connection, but the latch re-engaged on the disconnect, so the
    // command is gated out and nothing actuates.
    let mut sim = turmoil::Builder::new().build();
    let slot = RobotSlot::default();

    let host_slot = slot.clone();
    sim.host("robot", move || serve_robot(host_slot.clone(), 5001));

    sim.client("imposter", async move {
        let sender = FrameSender::new(sim_psk());
        let release = ControlCommand::EmergencyStop {
            engage: false,
            confirm: Some(ESTOP_CLEAR_CONFIRM.to_string()),
            reason: None,
        };
        let release_wire = sender.build(release.encode()?)?;
        let clamp_wire = sender.build(ControlCommand::ClampClose.encode()?)?;

        // Legitimate session.
        {
            let mut stream = turmoil::net::TcpStream::connect("robot:5001").await?;
            write_frame(&mut stream, &release_wire).await?;
            write_frame(&mut stream, &clamp_wire).await?;
            tokio::time::sleep(Duration::from_millis(100)).await;
        } // dropped: robot engages "disconnect"

        tokio::time::sleep(Duration::from_millis(200)).await;
        let robot = handles(&slot).expect("robot booted");
        assert_eq!(robot.safety.snapshot(robot.env.now()).reason, "disconnect");
        assert_eq!(robot.actuator.applied(), vec![ControlCommand::ClampClose]);

        // Imposter reconnects and replays only the recorded clamp frame
        // (seq 1 on a fresh receive state: accepted at the frame layer).
        let mut stream = turmoil::net::TcpStream::connect("robot:5001").await?;
        write_frame(&mut stream, &clamp_wire).await?;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            robot.actuator.applied(),
            vec![ControlCommand::ClampClose],
            "gate suppresses the replayed command while engaged"
        );
        assert!(robot.safety.snapshot(robot.env.now()).engaged);

        Ok(())
    });

    sim.run().unwrap();
}
