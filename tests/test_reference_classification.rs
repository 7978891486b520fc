mod common;

use common::{Marshaling, NativeHandle};
use std::sync::Arc;
use winrt_projection::ffi::abi::MSHCTX_INPROC;
use winrt_projection::ffi::ExecutionContext;
use winrt_projection::interop::{is_free_threaded, ContextSource, ReferenceClassifier};
use winrt_projection::{iids, HResult, ProjectionError};

struct FixedContext(u64);

impl ContextSource for FixedContext {
    fn capture(&self) -> ExecutionContext {
        ExecutionContext::new(self.0)
    }
}

#[test]
fn test_agile_object_is_free_threaded() {
    let native = NativeHandle::new(Marshaling::Agile);
    let reference = native.reference();
    assert_eq!(is_free_threaded(&reference), Ok(true));
    assert_eq!(native.last_marshal_context(), None);
}

#[test]
fn test_free_threaded_marshaler_is_free_threaded() {
    let native = NativeHandle::new(Marshaling::FreeThreaded);
    let reference = native.reference();
    assert_eq!(is_free_threaded(&reference), Ok(true));
    assert_eq!(native.last_marshal_context(), Some(MSHCTX_INPROC));
}

#[test]
fn test_other_marshalers_are_context_bound() {
    let standard = NativeHandle::new(Marshaling::Standard);
    assert_eq!(is_free_threaded(&standard.reference()), Ok(false));

    let plain = NativeHandle::new(Marshaling::None);
    assert_eq!(is_free_threaded(&plain.reference()), Ok(false));
}

#[test]
fn test_marshaler_failure_propagates() {
    let native = NativeHandle::new(Marshaling::Failing);
    let result = is_free_threaded(&native.reference());
    assert_eq!(result, Err(ProjectionError::Native(HResult::E_FAIL)));
}

#[test]
fn test_classification_releases_queried_pointers() {
    for marshaling in [
        Marshaling::Agile,
        Marshaling::FreeThreaded,
        Marshaling::Standard,
        Marshaling::Failing,
        Marshaling::None,
    ] {
        let native = NativeHandle::new(marshaling);
        let reference = native.reference();
        let baseline = native.ref_count();

        let _ = is_free_threaded(&reference);
        assert_eq!(native.ref_count(), baseline, "{:?} leaked a reference", marshaling);

        drop(reference);
        assert_eq!(native.ref_count(), 1);
    }
}

#[test]
fn test_null_pointer_yields_no_reference() {
    let classifier = ReferenceClassifier::default();
    let reference = unsafe { classifier.object_reference_for_interface(std::ptr::null_mut(), iids::IID_IUNKNOWN) };
    assert!(matches!(reference, Ok(None)));
}

#[test]
fn test_context_captured_only_for_context_bound_objects() {
    let classifier = ReferenceClassifier::new(Arc::new(FixedContext(42)));

    let agile = NativeHandle::new(Marshaling::Agile);
    let reference = unsafe { classifier.object_reference_for_interface(agile.as_raw(), iids::IID_IUNKNOWN) }
        .unwrap()
        .unwrap();
    assert!(reference.is_agile());

    let bound = NativeHandle::new(Marshaling::Standard);
    let reference = unsafe { classifier.object_reference_for_interface(bound.as_raw(), iids::IID_IUNKNOWN) }
        .unwrap()
        .unwrap();
    assert!(!reference.is_agile());
    assert_eq!(reference.context().map(|context| context.token), Some(42));

    // Queried interfaces keep the captured context.
    let identity = reference.identity().unwrap();
    assert_eq!(identity.context().map(|context| context.token), Some(42));
    assert_eq!(bound.ref_count(), 3);
}

#[test]
fn test_context_capture_disabled() {
    let classifier = ReferenceClassifier::new(Arc::new(FixedContext(7))).without_context_capture();
    let native = NativeHandle::new(Marshaling::None);
    let reference = unsafe { classifier.object_reference_for_interface(native.as_raw(), iids::IID_IUNKNOWN) }
        .unwrap()
        .unwrap();
    assert!(reference.is_agile());
    assert_eq!(native.last_marshal_context(), None);
}

#[test]
fn test_reference_owns_exactly_one_count() {
    let native = NativeHandle::new(Marshaling::None);
    let destroyed = native.destroyed_flag();
    let reference = native.reference();
    let duplicate = reference.clone();
    assert_eq!(native.ref_count(), 3);

    drop(duplicate);
    drop(reference);
    assert_eq!(native.ref_count(), 1);

    drop(native);
    assert!(destroyed.load(std::sync::atomic::Ordering::SeqCst));
}
