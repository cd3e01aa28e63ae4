use kernscope_core::{
    Expression, Field, IntrospectError, KernelIntrospector, Nesting, PanicMessage, SimThread,
    SimulatedTarget,
};

fn entry<'a>(entries: &'a [(&'static str, String)], name: &str) -> &'a str {
    entries
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.as_str())
        .unwrap_or_else(|| panic!("no entry {name}"))
}

#[test]
fn test_global_snapshot() {
    let mut target = SimulatedTarget::with_kernel();
    let main = target.add_thread(&SimThread::named("main"));
    target.set_system_time(1234);
    target.set_current_thread(main);
    target.set_preemption(20);
    target.set_isr_count(1);

    let mut introspector = KernelIntrospector::new(target);
    let snapshot = introspector.read_global_variables().unwrap().unwrap();

    assert_eq!(snapshot.system_time, 1234);
    assert_eq!(snapshot.preemption, Field::Present(20));
    assert_eq!(snapshot.panic_message, PanicMessage::Null);
    assert_eq!(snapshot.isr_nesting, Nesting::Inside);
    assert_eq!(snapshot.lock_nesting, Nesting::Outside);

    let entries = snapshot.entries();
    assert_eq!(entry(&entries, "vt_systime"), "1234");
    assert_eq!(entry(&entries, "r_current"), format!("{} \"main\"", main.hex()));
    assert_eq!(entry(&entries, "r_preempt"), "20");
    assert_eq!(entry(&entries, "dbg_panic_msg"), "<NULL>");
    assert_eq!(entry(&entries, "dbg_isr_cnt"), "within ISR");
    assert_eq!(entry(&entries, "dbg_lock_cnt"), "not within lock");
}

#[test]
fn test_no_current_thread() {
    let mut introspector = KernelIntrospector::new(SimulatedTarget::with_kernel());
    let snapshot = introspector.read_global_variables().unwrap().unwrap();
    assert_eq!(entry(&snapshot.entries(), "r_current"), "0");
}

#[test]
fn test_panic_message_is_read() {
    let mut target = SimulatedTarget::with_kernel();
    target.set_panic_message(Some("stack overflow"));
    let mut introspector = KernelIntrospector::new(target);
    let snapshot = introspector.read_global_variables().unwrap().unwrap();
    assert_eq!(snapshot.panic_message, PanicMessage::Message("stack overflow".into()));
}

#[test]
fn test_debug_counters_not_enabled() {
    let mut target = SimulatedTarget::with_kernel();
    target.fail_on(&Expression::Global("dbg_panic_msg"));
    target.fail_on(&Expression::Global("dbg_isr_cnt"));
    target.fail_on(&Expression::Global("dbg_lock_cnt"));
    target.fail_on(&Expression::Global("rlist.r_preempt"));

    let mut introspector = KernelIntrospector::new(target);
    let entries = introspector.read_global_variables().unwrap().unwrap().entries();
    assert_eq!(entry(&entries, "dbg_panic_msg"), "<not enabled>");
    assert_eq!(entry(&entries, "dbg_isr_cnt"), "<not enabled>");
    assert_eq!(entry(&entries, "dbg_lock_cnt"), "<not enabled>");
    assert_eq!(entry(&entries, "r_preempt"), "-");
}

#[test]
fn test_system_time_is_required() {
    let mut target = SimulatedTarget::with_kernel();
    target.fail_on(&Expression::Global("vtlist.vt_systime"));
    let mut introspector = KernelIntrospector::new(target);
    assert_eq!(
        introspector.read_global_variables(),
        Err(IntrospectError::TargetNotFound("kernel".into()))
    );
}

#[test]
fn test_snapshot_serializes_as_labelled_map() {
    let mut target = SimulatedTarget::with_kernel();
    target.set_system_time(42);
    let mut introspector = KernelIntrospector::new(target);
    let snapshot = introspector.read_global_variables().unwrap().unwrap();

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["vt_systime"], "42");
    assert_eq!(json["dbg_lock_cnt"], "not within lock");
}
