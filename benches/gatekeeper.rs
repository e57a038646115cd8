//! Benchmark for claim gating and asset naming
//!
//! Both run on every delivery, candidate or not.

use asset_provisioner::config::annotations::STORAGE_PROVISIONER;
use asset_provisioner::{
    claim_gatekeeper, derive_asset_name, ReclaimPolicy, StorageClassRecord,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

fn class() -> StorageClassRecord {
    StorageClassRecord {
        name: "storageClass1".into(),
        provisioner: "some-vendor/some-provisioner1".into(),
        reclaim_policy: ReclaimPolicy::Delete,
        default_owner_uid: 1000,
        default_owner_gid: 1000,
        asset_root: "nfs.local:/exports/pv".into(),
    }
}

fn claim(bound: bool) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some("some-app".into()),
            namespace: Some("sbx-namespace".into()),
            annotations: Some(
                [(
                    STORAGE_PROVISIONER.to_string(),
                    "some-vendor/some-provisioner1".to_string(),
                )]
                .into(),
            ),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name: Some("storageClass1".into()),
            volume_name: bound.then(|| "taken".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn bench_claim_gatekeeper(c: &mut Criterion) {
    let mut group = c.benchmark_group("gatekeeper");
    group.throughput(Throughput::Elements(1));

    let gate = claim_gatekeeper();
    let class = class();

    let candidate = claim(false);
    group.bench_function("evaluate_candidate", |b| {
        b.iter(|| gate.evaluate(black_box(&candidate), Some(&class)).passed());
    });

    let bound = claim(true);
    group.bench_function("evaluate_bound", |b| {
        b.iter(|| gate.evaluate(black_box(&bound), Some(&class)).passed());
    });

    group.finish();
}

fn bench_derive_asset_name(c: &mut Criterion) {
    let mut group = c.benchmark_group("naming");
    group.throughput(Throughput::Elements(1));

    group.bench_function("derive_asset_name", |b| {
        b.iter(|| derive_asset_name(black_box(&["-sbx-namespace-", "some-app-"])));
    });

    group.finish();
}

criterion_group!(benches, bench_claim_gatekeeper, bench_derive_asset_name);
criterion_main!(benches);
