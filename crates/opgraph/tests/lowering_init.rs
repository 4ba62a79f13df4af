use std::sync::{Arc, Barrier};
use std::thread;

use opgraph::backend::{LoweringContext, LoweringRuntime, PassManagerOptions};

const THREADS: usize = 16;

#[test]
fn concurrent_initialization_runs_once() {
    let runtime = Arc::new(LoweringRuntime::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|index| {
            let runtime = Arc::clone(&runtime);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let options = PassManagerOptions {
                    max_fusion_rounds: index + 1,
                    ..PassManagerOptions::default()
                };
                barrier.wait();
                runtime.initialize_with(options)
            })
        })
        .collect();
    let contexts: Vec<Arc<LoweringContext>> = handles
        .into_iter()
        .map(|handle| handle.join().expect("initializer thread panicked"))
        .collect();

    assert_eq!(runtime.initialization_count(), 1);
    let first = &contexts[0];
    assert!(contexts.iter().all(|context| Arc::ptr_eq(context, first)));
    assert!(Arc::ptr_eq(&runtime.expect_initialized(), first));
}

#[test]
fn later_initialization_keeps_first_context() {
    let runtime = LoweringRuntime::new();
    assert!(!runtime.is_initialized());
    assert!(runtime.context().is_none());
    assert_eq!(runtime.initialization_count(), 0);

    let first = runtime.initialize_with(PassManagerOptions {
        op_fusion: false,
        ..PassManagerOptions::default()
    });
    let second = runtime.initialize_with(PassManagerOptions::default());
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!second.options().op_fusion);

    let third = runtime.initialize().unwrap();
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(runtime.initialization_count(), 1);
    assert!(runtime.is_initialized());
}

#[test]
#[should_panic(expected = "lowering runtime used before initialization")]
fn uninitialized_runtime_panics() {
    LoweringRuntime::new().expect_initialized();
}
