use crate::api::{
    DescriptorRange, DescriptorRangeType, RootParameter, RootSignatureDesc, RootSignatureFlags, ShaderVisibility,
    VersionedRootSignatureDesc, MAX_ROOT_COST,
};
use crate::error::{HarnessError, Hresult};
use crate::harness::fixture::{destroy_test_context, init_test_context, TestContextDesc, TestEnv};
use crate::harness::pipeline::{create_32bit_constants_root_signature, create_root_signature};
use crate::harness::report;
use crate::harness::rs_check::{
    battery, check_root_signature_blob, check_root_signature_deserialization, check_root_signature_serialization,
};

/// The single root UAV at `u6` decodes and re-encodes word for word.
pub fn test_root_signature_uav_round_trip(env: &TestEnv) {
    let runtime = &*env.runtime;
    let Some(entry) = battery().into_iter().find(|entry| entry.name == "uav") else {
        report::fail("Missing root UAV blob.");
        return;
    };
    let desc = RootSignatureDesc {
        parameters: vec![RootParameter::uav(6, 0, ShaderVisibility::All)],
        ..Default::default()
    };
    report::check(
        entry.desc == VersionedRootSignatureDesc::V1_0(desc.clone()),
        "Unexpected root UAV description.",
    );

    check_root_signature_deserialization(runtime, &entry.blob, &desc);
    check_root_signature_serialization(runtime, &entry.blob, &desc);

    if let Some(deserializer) = report::check_ok(
        runtime.create_versioned_root_signature_deserializer(&entry.blob),
        "Failed to create versioned deserializer",
    ) {
        let unconverted = deserializer.unconverted_root_signature_desc();
        report::check(
            unconverted == VersionedRootSignatureDesc::V1_0(desc.clone()),
            format!("Got {:?}.", unconverted),
        );
        let refcount = deserializer.release();
        report::check(refcount == 0, format!("Got refcount {}.", refcount));
    }

    // A truncated blob is rejected.
    let truncated = &entry.blob[..entry.blob.len() - 4];
    let result = runtime.create_root_signature_deserializer(truncated);
    report::check(result.is_err(), "Truncated blob was accepted.");
}

pub fn test_root_signature_battery(env: &TestEnv) {
    for entry in battery() {
        check_root_signature_blob(&*env.runtime, &entry);
    }
}

#[track_caller]
fn check_cost_rejected(result: Result<impl Sized, HarnessError>, what: &str) {
    match result {
        Ok(_) => report::fail(format!("{}: root signature over the cost limit was accepted.", what)),
        Err(HarnessError::Api { hr, .. }) => {
            report::check_hr(hr, Hresult::E_INVALIDARG, what);
        }
        Err(e) => report::fail(format!("{}: {}.", what, e)),
    }
}

/// Roots are limited to 64 DWORDs, counting tables as one and root
/// descriptors as two.
pub fn test_root_signature_cost(env: &TestEnv) {
    let desc = TestContextDesc {
        no_render_target: true,
        no_root_signature: true,
        no_pipeline: true,
        ..Default::default()
    };
    let Some(context) = init_test_context(env, Some(&desc)) else {
        return;
    };
    let runtime = &*context.runtime;
    let device = &*context.device;
    let flags = RootSignatureFlags::NONE;

    let fits = create_32bit_constants_root_signature(runtime, device, 0, MAX_ROOT_COST, ShaderVisibility::All, flags);
    report::check_ok(fits, "64 root constants");
    let over =
        create_32bit_constants_root_signature(runtime, device, 0, MAX_ROOT_COST + 1, ShaderVisibility::All, flags);
    check_cost_rejected(over, "65 root constants");

    let mixed = |constants: u32| RootSignatureDesc {
        parameters: vec![
            RootParameter::table(
                vec![DescriptorRange::new(DescriptorRangeType::Srv, 8, 0)],
                ShaderVisibility::Pixel,
            ),
            RootParameter::cbv(0, 0, ShaderVisibility::All),
            RootParameter::uav(0, 0, ShaderVisibility::All),
            RootParameter::constants(1, 0, constants, ShaderVisibility::All),
        ],
        ..Default::default()
    };
    report::check(mixed(59).dword_cost() == MAX_ROOT_COST, format!("Got cost {}.", mixed(59).dword_cost()));
    report::check_ok(create_root_signature(runtime, device, &mixed(59)), "Mixed root at the limit");
    check_cost_rejected(create_root_signature(runtime, device, &mixed(60)), "Mixed root over the limit");

    destroy_test_context(context);
}
