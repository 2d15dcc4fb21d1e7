use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use healthcheck::{
    ChartOptions, Error, HealthCheck, Payload, SubsystemLookup, load_json, load_path,
};
use tempfile::TempDir;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/data.json")
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = LogBuffer::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buf.contents())
}

#[test]
fn test_load_fixture() {
    let hc = load_json(fixture()).unwrap();
    assert_eq!(hc.len(), 30);
    assert!(hc.table().join_report().is_lossless());
    assert_eq!(hc.subsystems(), vec!["DriveSubsystem", "IntakeSubsystem"]);
    assert_eq!(hc.controllers(), vec![1, 2, 20]);
    assert_eq!(hc.controllers_for_case(0), vec![1, 2]);

    let cases = hc.cases();
    assert_eq!(cases.len(), 4);
    assert_eq!(cases[3].name, "IntakeSubsystem");
    assert_eq!(cases[3].output, -0.5);
    assert_eq!(cases[1].controller, 2);
}

#[test]
fn test_rows_sorted_by_controller_then_case() {
    let hc = load_json(fixture()).unwrap();
    let table = hc.table();
    let keys: Vec<(i64, i64)> = (0..table.num_rows())
        .map(|row| {
            (
                table.controllers_measured().value(row),
                table.case_ids().value(row),
            )
        })
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(table.index().get(1, 1), Some(5..10));
    assert_eq!(table.index().get(20, 3), Some(25..30));
}

#[test]
fn test_subsystem_lookup() {
    let hc = load_json(fixture()).unwrap();
    assert_eq!(hc.subsystem_for_controller(20), "IntakeSubsystem");
    assert_eq!(hc.subsystem_for_controller(1), "DriveSubsystem");

    let (name, logs) = with_captured_logs(|| hc.subsystem_for_controller(99));
    assert_eq!(name, "");
    assert!(logs.contains("no subsystem found for controller 99"), "{logs}");
}

#[test]
fn test_subsystem_lookup_multiple_owners() {
    let payload = Payload::from_json_str(
        r#"{
            "meta": [
                {"case": 0, "case_uuid": "a", "name": "DriveSubsystem", "talon": 1,
                 "type": "time", "output": 0.25, "duration": 5000000},
                {"case": 1, "case_uuid": "b", "name": "IntakeSubsystem", "talon": 1,
                 "type": "time", "output": 0.25, "duration": 5000000}
            ],
            "data": [
                {"case": 0, "msec_elapsed": 0, "talon": 1, "voltage": 0.0, "position": 0.0,
                 "speed": 0.0, "supply_current": 0.0, "stator_current": 0.0},
                {"case": 1, "msec_elapsed": 0, "talon": 1, "voltage": 0.0, "position": 0.0,
                 "speed": 0.0, "supply_current": 0.0, "stator_current": 0.0}
            ]
        }"#,
    )
    .unwrap();
    let hc = HealthCheck::from_payload(payload).unwrap();

    let (lookup, logs) = with_captured_logs(|| hc.subsystem_lookup(1));
    assert_eq!(
        lookup,
        SubsystemLookup::Multiple(vec![
            "DriveSubsystem".to_string(),
            "IntakeSubsystem".to_string()
        ])
    );
    assert!(logs.contains("multiple subsystem found for controller 1"), "{logs}");
    assert_eq!(hc.subsystem_for_controller(1), "DriveSubsystem,IntakeSubsystem");
}

#[test]
fn test_plot_y_limits() {
    let hc = load_json(fixture()).unwrap();
    let limits = hc.plot_y_limits(&[0, 1], &[1, 2]).unwrap();
    assert_relative_eq!(limits.supply_current.0, -0.2875);
    assert_relative_eq!(limits.supply_current.1, 4.5375);
    assert_relative_eq!(limits.stator_current.0, -0.8);
    assert_relative_eq!(limits.stator_current.1, 8.8);
    assert_relative_eq!(limits.speed.0, -300.0);
    assert_relative_eq!(limits.speed.1, 3300.0);

    let limits = hc.plot_y_limits(&[2, 3], &[20]).unwrap();
    assert_relative_eq!(limits.speed.0, -3300.0);
    assert_relative_eq!(limits.speed.1, 1800.0);

    assert!(matches!(
        hc.plot_y_limits(&[0], &[20]),
        Err(Error::EmptySelection(_))
    ));
}

#[test]
fn test_snapshot_round_trip() {
    let temp = TempDir::new().unwrap();
    let hc = load_json(fixture()).unwrap();
    let path = hc.save(Some(temp.path()), false).unwrap();
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some(hc.snapshot_file_name().unwrap().as_str())
    );

    let loaded = load_path(&path).unwrap();
    assert_eq!(loaded.len(), 30);
    assert_eq!(loaded.created(), hc.created());
    assert_eq!(loaded.cases(), hc.cases());
    assert_eq!(loaded.subsystem_for_controller(20), "IntakeSubsystem");
    assert_eq!(loaded.table().index(), hc.table().index());

    assert!(matches!(
        hc.save(Some(&path), false),
        Err(Error::SnapshotExists(_))
    ));
}

#[test]
fn test_swerve_view() {
    let hc = load_json(fixture()).unwrap();
    let sd = hc.swerve_drive_health_check();
    assert!(sd.shares_table(&hc));
    assert_eq!(sd.controllers(), vec![1, 2]);
    assert_eq!(sd.cases().len(), 2);
    assert_eq!(sd.len(), hc.len());
}

#[test]
fn test_chart_plan_from_fixture() {
    let mut hc = load_json(fixture()).unwrap();
    hc.set_case_limits(2, &[Some(0.0), Some(2.0)], &[], &[])
        .unwrap();
    let plan = hc
        .chart_plan(&[2, 3], &[20], ChartOptions::default())
        .unwrap();
    assert_eq!(plan.rows.len(), 2);
    assert_eq!(plan.rows[1].title, "Case 3: IntakeSubsystem (time, output -0.5)");

    let supply = &plan.rows[0].panels[0];
    assert_eq!(supply.limits.high, Some(2.0));
    assert_eq!(supply.series[0].points.len(), 5);
    assert_eq!(supply.x_range, (0.0, 4.0));
    assert!(plan.rows[1].panels[0].limits.is_empty());
}
