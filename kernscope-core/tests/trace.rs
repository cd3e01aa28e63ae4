use kernscope_core::{
    Address, IntegrityViolation, IntrospectError, IntrospectorConfig, KernelIntrospector,
    KernelLayout, SimThread, SimulatedTarget,
};

fn target_with_threads() -> (SimulatedTarget, Address, Address) {
    let mut target = SimulatedTarget::with_kernel();
    let main = target.add_thread(&SimThread::named("main"));
    let idle = target.add_thread(&SimThread::named("idle"));
    (target, main, idle)
}

#[test]
fn test_trace_not_compiled_in() {
    let mut introspector = KernelIntrospector::new(SimulatedTarget::with_kernel());
    assert_eq!(
        introspector.read_trace_buffer(),
        Err(IntrospectError::TargetNotFound("trace buffer".into()))
    );
}

#[test]
fn test_zero_sized_buffer_is_empty() {
    let mut target = SimulatedTarget::with_kernel();
    target.enable_trace(0);
    let mut introspector = KernelIntrospector::new(target);
    assert!(introspector.read_trace_buffer().unwrap().unwrap().is_empty());
}

#[test]
fn test_partially_filled_buffer_skips_empty_slots() {
    let (mut target, main, idle) = target_with_threads();
    target.enable_trace(4);
    target.record_switch(100, main, 0, 6);
    target.record_switch(110, idle, 0x2000_0800, 3);

    let mut introspector = KernelIntrospector::new(target);
    let trace = introspector.read_trace_buffer().unwrap().unwrap();

    assert_eq!(trace.keys().copied().collect::<Vec<_>>(), vec![-1, 0]);
    let oldest = trace.get(&-1).unwrap();
    assert_eq!(oldest.timestamp, 100);
    assert_eq!(oldest.thread, main);
    assert_eq!(oldest.state_label, "SLEEPING");
    let newest = trace.get(&0).unwrap();
    assert_eq!(newest.thread, idle);
    assert_eq!(newest.wait_object, Address::new(0x2000_0800));
    assert_eq!(newest.state_label, "WTSEM");
}

#[test]
fn test_wrapped_buffer_is_read_oldest_first() {
    let (mut target, main, idle) = target_with_threads();
    target.enable_trace(4);
    for time in 1..=6 {
        let thread = if time % 2 == 0 { idle } else { main };
        target.record_switch(time, thread, 0, 0);
    }

    let mut introspector = KernelIntrospector::new(target);
    let trace = introspector.read_trace_buffer().unwrap().unwrap();

    let keys: Vec<i64> = trace.keys().copied().collect();
    assert_eq!(keys, vec![-3, -2, -1, 0]);
    let times: Vec<u32> = trace.iter().map(|(_, event)| event.timestamp).collect();
    assert_eq!(times, vec![3, 4, 5, 6]);
}

#[test]
fn test_switches_pair_each_event_with_previous_thread() {
    let (mut target, main, idle) = target_with_threads();
    target.enable_trace(8);
    target.record_switch(1, main, 0, 0);
    target.record_switch(2, idle, 0, 0);
    target.record_switch(3, main, 0, 0);

    let mut introspector = KernelIntrospector::new(target);
    let trace = introspector.read_trace_buffer().unwrap().unwrap();
    let previous: Vec<Option<Address>> = trace.switches().map(|s| s.previous).collect();
    assert_eq!(previous, vec![None, Some(main), Some(idle)]);
}

#[test]
fn test_cursor_outside_buffer_is_rejected() {
    let mut target = SimulatedTarget::with_kernel();
    let start = target.enable_trace(4);
    target.write_field("ch_trace_buffer_t", Address::new(start.value() - 8), "tb_ptr", 0x2000_0000);

    let mut introspector = KernelIntrospector::new(target);
    let err = introspector.read_trace_buffer().unwrap_err();
    assert!(matches!(
        err,
        IntrospectError::TargetIntegrity {
            structure: "trace buffer",
            violation: IntegrityViolation::CursorOutOfRange { .. },
        }
    ));
}

#[test]
fn test_cursor_between_slots_is_rejected() {
    let (mut target, main, _) = target_with_threads();
    let start = target.enable_trace(4);
    target.record_switch(1, main, 0, 0);
    target.write_field(
        "ch_trace_buffer_t",
        Address::new(start.value() - 8),
        "tb_ptr",
        start.value() + 4,
    );

    let mut introspector = KernelIntrospector::new(target);
    let err = introspector.read_trace_buffer().unwrap_err();
    assert_eq!(
        err,
        IntrospectError::integrity(
            "trace buffer",
            IntegrityViolation::MisalignedCursor {
                cursor: Address::new(start.value() + 4),
                base: start,
                record_size: 16,
            }
        )
    );
    assert!(err.to_string().contains("not a multiple of 16 bytes"));
}

#[test]
fn test_zero_record_size_is_rejected() {
    let mut layout = KernelLayout::default();
    layout.structs.get_mut("ch_swc_event_t").unwrap().size = 0;
    let mut target = SimulatedTarget::with_kernel_layout(layout);
    target.enable_trace(4);

    let mut introspector = KernelIntrospector::new(target);
    assert_eq!(
        introspector.read_trace_buffer(),
        Err(IntrospectError::integrity(
            "trace buffer",
            IntegrityViolation::ZeroRecordSize
        ))
    );
}

#[test]
fn test_oversized_buffer_is_rejected() {
    let mut target = SimulatedTarget::with_kernel();
    target.enable_trace(16);
    let config = IntrospectorConfig {
        max_trace_events: 8,
        ..IntrospectorConfig::default()
    };

    let mut introspector = KernelIntrospector::with_config(target, config);
    assert_eq!(
        introspector.read_trace_buffer(),
        Err(IntrospectError::integrity(
            "trace buffer",
            IntegrityViolation::Oversized { size: 16, limit: 8 }
        ))
    );
}
