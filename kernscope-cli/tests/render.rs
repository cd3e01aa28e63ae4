use kernscope_cli::{run, Command, OutputFormat, RUNNING_NOTICE};
use kernscope_core::{IntrospectorConfig, SimThread, SimulatedTarget};

fn render(target: SimulatedTarget, command: Command, format: OutputFormat) -> String {
    run(target, command, format, IntrospectorConfig::default()).expect("render failed")
}

#[test]
fn test_threads_table() {
    let mut target = SimulatedTarget::with_kernel();
    let main = target.add_thread(&SimThread {
        flags: 0x02,
        priority: 64,
        ..SimThread::named("main")
    });

    let output = render(target, Command::Threads, OutputFormat::Table);
    let mut lines = output.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("Address"));
    assert!(header.contains("StkUnused"));

    let row = lines.next().unwrap();
    assert!(row.starts_with(&main.hex()));
    assert!(row.contains("main"));
    assert!(row.contains("READY"));
    assert!(row.contains("0x02"));
    assert!(row.contains(" 192 "));
}

#[test]
fn test_timers_table_shows_absolute_time_and_delta() {
    let mut target = SimulatedTarget::with_kernel();
    target.add_timer(10, 0x0800_0101, 0);
    target.add_timer(5, 0x0800_0201, 0x2000_0010);

    let output = render(target, Command::Timers, OutputFormat::Table);
    let rows: Vec<&str> = output.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains("+10"));
    assert!(rows[1].contains(" 15 "));
    assert!(rows[1].contains("+5"));
    assert!(rows[1].contains("0x08000201"));
    assert!(rows[1].contains("0x20000010"));
}

#[test]
fn test_trace_table_labels_threads() {
    let mut target = SimulatedTarget::with_kernel();
    let main = target.add_thread(&SimThread::named("main"));
    let idle = target.add_thread(&SimThread::named("idle"));
    target.enable_trace(4);
    target.record_switch(1, main, 0, 0);
    target.record_switch(2, idle, 0, 6);

    let output = render(target, Command::Trace, OutputFormat::Table);
    let rows: Vec<&str> = output.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("-1"));
    assert!(rows[1].starts_with('0'));
    assert!(rows[1].contains(&format!("{} \"main\"", main.hex())));
    assert!(rows[1].contains(&format!("{} \"idle\"", idle.hex())));
    assert!(rows[1].contains("SLEEPING"));
}

#[test]
fn test_globals_table() {
    let mut target = SimulatedTarget::with_kernel();
    target.set_system_time(777);
    let output = render(target, Command::Globals, OutputFormat::Table);
    assert!(output.contains("vt_systime     777"));
    assert!(output.contains("dbg_panic_msg  <NULL>"));
}

#[test]
fn test_running_target_prints_notice() {
    let mut target = SimulatedTarget::with_kernel();
    target.set_running(true);
    assert_eq!(render(target, Command::All, OutputFormat::Table), RUNNING_NOTICE);
}

#[test]
fn test_threads_json() {
    let mut target = SimulatedTarget::with_kernel();
    let main = target.add_thread(&SimThread::named("main"));
    let output = render(target, Command::Threads, OutputFormat::Json);

    let json: serde_json::Value = serde_json::from_str(&output).unwrap();
    let record = &json[main.value().to_string()];
    assert_eq!(record["name"], "main");
    assert_eq!(record["state_label"], "READY");
    assert_eq!(record["unused_stack"], 192);
}

#[test]
fn test_all_reports_failing_view_and_continues() {
    let mut target = SimulatedTarget::with_kernel();
    target.add_thread(&SimThread::named("main"));

    let output = render(target, Command::All, OutputFormat::Table);
    assert!(output.contains("[threads]"));
    assert!(output.contains("[trace]\nerror: trace buffer not found on target"));
    assert!(output.contains("[globals]"));

    let mut target = SimulatedTarget::with_kernel();
    target.add_thread(&SimThread::named("main"));
    let json: serde_json::Value =
        serde_json::from_str(&render(target, Command::All, OutputFormat::Json)).unwrap();
    assert!(json["trace"]["error"].is_string());
    assert_eq!(json["globals"]["vt_systime"], "0");
}

#[test]
fn test_single_view_error_propagates() {
    let target = SimulatedTarget::with_kernel();
    let err = run(target, Command::Trace, OutputFormat::Table, IntrospectorConfig::default()).unwrap_err();
    assert_eq!(err.to_string(), "trace buffer not found on target");
}
