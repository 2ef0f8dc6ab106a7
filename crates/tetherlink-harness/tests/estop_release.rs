//! E-STOP release scenarios over the simulated network.
//!
//! The operator connects to the real control connection handler through
//! turmoil TCP. A correct confirm string releases the latch and actuation
//! flows; a wrong confirm is rejected in place.

use std::time::Duration;

use tetherlink_core::Environment;
use tetherlink_core::constants::ESTOP_CLEAR_CONFIRM;
use tetherlink_harness::{RobotSlot, handles, serve_robot, sim_psk};
use tetherlink_proto::{ControlCommand, FrameSender, io::write_frame};
use tokio::io::AsyncWriteExt;

fn release_command(confirm: &str) -> ControlCommand {
    ControlCommand::EmergencyStop {
        engage: false,
        confirm: Some(confirm.to_string()),
        reason: None,
    }
}

#[test]
fn correct_confirm_releases_and_actuation_flows() {
    let mut sim = turmoil::Builder::new().build();
    let slot = RobotSlot::default();

    let host_slot = slot.clone();
    sim.host("robot", move || serve_robot(host_slot.clone(), 5001));

    sim.client("operator", async move {
        let mut stream = turmoil::net::TcpStream::connect("robot:5001").await?;
        let sender = FrameSender::new(sim_psk());

        let wire = sender.build(release_command(ESTOP_CLEAR_CONFIRM).encode()?)?;
        write_frame(&mut stream, &wire).await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let robot = handles(&slot).expect("robot booted");
        let snapshot = robot.safety.snapshot(robot.env.now());
        assert!(!snapshot.engaged, "latch must release on the correct confirm");
        assert_eq!(snapshot.reason, "");

        // A routed command now produces exactly one actuator apply.
        let wire = sender.build(ControlCommand::ClampClose.encode()?)?;
        write_frame(&mut stream, &wire).await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(robot.actuator.applied(), vec![ControlCommand::ClampClose]);

        stream.shutdown().await?;
        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn wrong_confirm_is_rejected_in_place() {
    let mut sim = turmoil::Builder::new().build();
    let slot = RobotSlot::default();

    let host_slot = slot.clone();
    sim.host("robot", move || serve_robot(host_slot.clone(), 5001));

    sim.client("operator", async move {
        let mut stream = turmoil::net::TcpStream::connect("robot:5001").await?;
        let sender = FrameSender::new(sim_psk());

        let wire = sender.build(release_command("CLEAR_ESTOP").encode()?)?;
        write_frame(&mut stream, &wire).await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let robot = handles(&slot).expect("robot booted");
        let snapshot = robot.safety.snapshot(robot.env.now());
        assert!(snapshot.engaged, "wrong confirm must not release");
        assert_eq!(snapshot.reason, "boot_default");

        // A gated command goes nowhere.
        let wire = sender.build(ControlCommand::ClampOpen.encode()?)?;
        write_frame(&mut stream, &wire).await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(robot.actuator.applied().is_empty());
        assert!(robot.safety.snapshot(robot.env.now()).gated_out >= 1);

        stream.shutdown().await?;
        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn release_is_refused_while_disconnected_state_is_claimed() {
    // The dispatcher path always passes control_connected = true (the
    // command just arrived over the connection), so the disconnected guard
    // is exercised directly against the core.
    let mut sim = turmoil::Builder::new().build();
    let slot = RobotSlot::default();

    let host_slot = slot.clone();
    sim.host("robot", move || serve_robot(host_slot.clone(), 5001));

    sim.client("operator", async move {
        // Boot the host by touching it once.
        let _ = turmoil::net::TcpStream::connect("robot:5001").await?;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let robot = handles(&slot).expect("robot booted");
        let rejected = robot.safety.clear(ESTOP_CLEAR_CONFIRM, false, Duration::ZERO);
        assert!(rejected.is_err());
        assert!(robot.safety.snapshot(robot.env.now()).engaged);
        Ok(())
    });

    sim.run().unwrap();
}
