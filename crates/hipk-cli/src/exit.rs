// Exit codes for scripted triage
use hipk_harness::HarnessError;
use hipk_runtime::RocmError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERIC_FAIL: i32 = 1;
pub const EXIT_VALIDATION_FAIL: i32 = 2;
pub const EXIT_DEVICE_FAIL: i32 = 3;

/// Map an error chain to the most specific exit code it contains.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<HarnessError>() {
            return match e {
                HarnessError::Validation(_) => EXIT_VALIDATION_FAIL,
                HarnessError::Runtime(_) => EXIT_DEVICE_FAIL,
                _ => EXIT_GENERIC_FAIL,
            };
        }
        if cause.downcast_ref::<RocmError>().is_some() {
            return EXIT_DEVICE_FAIL;
        }
    }
    EXIT_GENERIC_FAIL
}

/// Raw HIP status carried anywhere in the chain, if the failure came from the runtime.
pub fn device_status_for(err: &anyhow::Error) -> Option<i32> {
    err.chain().find_map(|cause| {
        if let Some(HarnessError::Runtime(e)) = cause.downcast_ref::<HarnessError>() {
            return e.status();
        }
        cause.downcast_ref::<RocmError>().and_then(RocmError::status)
    })
}
