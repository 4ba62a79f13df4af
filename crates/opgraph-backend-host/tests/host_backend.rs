use std::ptr::NonNull;
use std::sync::Arc;

use opgraph::backend::registry::{create_provider, has_provider, list_providers, register_provider};
use opgraph::backend::{
    Compiler, ExecutionProvider, LoweredModule, LoweringContext, PassManagerOptions, ProviderError,
    TensorBufferProvider,
};
use opgraph::ops::{self, AutoBroadcastSpec, Graph};
use opgraph::tensor::{AxisSet, Dimension, ElementType, PartialShape, Shape};
use opgraph_backend_host::{
    compile_on_host, register_host_backend, HostBufferProvider, HostProvider, HOST_PROVIDER_NAME,
};
use rstest::rstest;

fn context() -> Arc<LoweringContext> {
    Arc::new(LoweringContext::new(PassManagerOptions::default()))
}

fn broadcast_graph(rows: usize) -> Graph {
    let mut graph = Graph::new();
    let x = ops::v0::parameter(&mut graph, ElementType::F32, Shape::new(vec![3]));
    let y = ops::v0::broadcast(&mut graph, x, Shape::new(vec![rows, 3]), AxisSet::from([0])).unwrap();
    graph.add_result(y);
    graph
}

fn lower(graph: &Graph) -> LoweredModule {
    Compiler::new(graph, context()).compile().unwrap()
}

#[test]
fn host_provider_is_registered_once() {
    register_host_backend();
    register_host_backend();
    assert!(has_provider(HOST_PROVIDER_NAME));
    assert!(list_providers().contains(&HOST_PROVIDER_NAME.to_string()));

    let replaced = register_provider(HOST_PROVIDER_NAME, || {
        Arc::new(HostProvider::new()) as Arc<dyn ExecutionProvider>
    });
    assert!(!replaced);

    let provider = create_provider(HOST_PROVIDER_NAME).unwrap();
    assert_eq!(provider.name(), HOST_PROVIDER_NAME);
    assert!(create_provider("no-such-provider").is_none());
}

#[rstest]
#[case(ElementType::F32, &[2, 3], 24)]
#[case(ElementType::F16, &[4], 8)]
#[case(ElementType::I64, &[], 8)]
#[case(ElementType::Boolean, &[0, 5], 0)]
fn owned_tensors_are_sized_from_type(
    #[case] element_type: ElementType,
    #[case] dims: &[usize],
    #[case] bytes: usize,
) {
    let tensor = HostBufferProvider
        .create_tensor(element_type, &Shape::new(dims.to_vec()))
        .unwrap();
    assert_eq!(tensor.byte_len(), bytes);
    assert_eq!(tensor.element_type(), element_type);
    assert!(!tensor.is_caller_owned());
}

#[test]
fn dynamic_element_type_has_no_layout() {
    let err = HostBufferProvider
        .create_tensor(ElementType::Dynamic, &Shape::new(vec![2]))
        .unwrap_err();
    assert!(matches!(err, ProviderError::UnsupportedElementType(ElementType::Dynamic)));
}

#[test]
fn dynamic_tensors_defer_storage() {
    let shape = PartialShape::new(vec![Dimension::Dynamic, Dimension::Static(3)]);
    let tensor = HostBufferProvider
        .create_dynamic_tensor(ElementType::F32, &shape)
        .unwrap();
    assert_eq!(tensor.byte_len(), 0);
    assert_eq!(tensor.shape(), &shape);

    let known = HostBufferProvider
        .create_dynamic_tensor(ElementType::F32, &PartialShape::from_static(&[2, 3]))
        .unwrap();
    assert_eq!(known.byte_len(), 24);
}

#[test]
fn raw_tensors_borrow_caller_memory() {
    let mut storage = vec![7u8; 12];
    let data = NonNull::new(storage.as_mut_ptr()).unwrap();
    // SAFETY: `storage` holds three f32 values and outlives `tensor`.
    let tensor = unsafe {
        HostBufferProvider
            .create_tensor_from_raw(ElementType::F32, &Shape::new(vec![3]), data)
            .unwrap()
    };
    assert!(tensor.is_caller_owned());
    assert_eq!(tensor.byte_len(), 12);
    drop(tensor);
    assert_eq!(storage, vec![7u8; 12]);
}

#[test]
fn prepared_modules_are_cached_by_fingerprint() {
    let provider = HostProvider::new();
    let first = provider.prepare_host(&lower(&broadcast_graph(2))).unwrap();
    let again = provider.prepare_host(&lower(&broadcast_graph(2))).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(provider.cached_executables(), 1);

    let other = provider.prepare_host(&lower(&broadcast_graph(5))).unwrap();
    assert_ne!(other.fingerprint(), first.fingerprint());
    assert_eq!(provider.cached_executables(), 2);

    let results = first.allocate_results().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].byte_len(), 24);
}

#[test]
fn arguments_are_checked_against_signature() {
    let provider = HostProvider::new();
    let lowered = lower(&broadcast_graph(2));
    let executable = provider.prepare(&lowered, provider.buffers()).unwrap();
    let buffers = provider.buffers();

    let good = buffers.create_tensor(ElementType::F32, &Shape::new(vec![3])).unwrap();
    executable.check_arguments(&[good.clone()]).unwrap();

    let err = executable.check_arguments(&[]).unwrap_err();
    assert!(matches!(err, ProviderError::ArgumentCount { expected: 1, actual: 0 }));

    let wrong_type = buffers.create_tensor(ElementType::I32, &Shape::new(vec![3])).unwrap();
    let err = executable.check_arguments(&[wrong_type]).unwrap_err();
    assert!(matches!(err, ProviderError::ArgumentType { index: 0, .. }));

    let wrong_shape = buffers.create_tensor(ElementType::F32, &Shape::new(vec![4])).unwrap();
    assert!(executable.check_arguments(&[wrong_shape]).is_err());

    let pending = buffers
        .create_dynamic_tensor(ElementType::F32, &PartialShape::with_rank(1))
        .unwrap();
    executable.check_arguments(&[pending]).unwrap();
}

#[test]
fn compile_on_host_prepares_native_module() {
    let mut graph = Graph::new();
    let matrix = ops::v0::parameter(&mut graph, ElementType::F32, Shape::new(vec![2, 3]));
    let row = ops::v0::parameter(&mut graph, ElementType::F32, Shape::new(vec![3]));
    let total = ops::v1::add(&mut graph, matrix, row, AutoBroadcastSpec::NUMPY).unwrap();
    graph.add_result(total);

    let executable = compile_on_host(&graph, context()).unwrap();
    assert_eq!(executable.signature().parameters.len(), 2);
    assert_eq!(
        executable.signature().results[0].shape,
        PartialShape::from_static(&[2, 3])
    );
    assert_eq!(executable.module().function.body.len(), 2);
}

#[test]
fn compile_on_host_reports_lowering_failures() {
    let mut graph = Graph::new();
    let x = ops::v0::parameter(&mut graph, ElementType::F32, Shape::new(vec![3]));
    let shape = ops::v0::parameter(&mut graph, ElementType::I64, Shape::new(vec![2]));
    let out = ops::v3::broadcast_auto(&mut graph, x, shape, AutoBroadcastSpec::NUMPY).unwrap();
    graph.add_result(out);

    let err = compile_on_host(&graph, context()).err().unwrap();
    assert!(err.to_string().contains("compilation failed"));
}
