//! Benchmark for host and storage placement
//!
//! Target: placement for 1K hosts well under a millisecond

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use provisioning_controller::balancer::{
    BalancerElement, BalancerSection, Limit, Strategy, Weights,
};
use provisioning_controller::inventory::{HostDescriptor, StorageDescriptor};
use provisioning_controller::{
    keys, BalancerDocument, BalancerKind, InventorySnapshot, PlacementBalancers,
    ProvisioningSettings,
};
use std::sync::Arc;

const GIB: u64 = 1024 * 1024 * 1024;

fn inventory(hosts: usize) -> Arc<InventorySnapshot> {
    let mut host_list = Vec::with_capacity(hosts);
    let mut storages = Vec::with_capacity(hosts * 2);
    for i in 0..hosts {
        let id = format!("esx-{:04}", i);
        host_list.push(HostDescriptor {
            id: id.clone(),
            cpu_capacity_mhz: 20_000,
            cpu_usage_mhz: (i as u64 * 37) % 20_000,
            memory_capacity_mb: 131_072,
            memory_usage_mb: (i as u64 * 911) % 131_072,
            vm_count: (i % 40) as u32,
            enabled: true,
        });
        for d in 0..2 {
            storages.push(StorageDescriptor {
                id: format!("ds-{:04}-{}", i, d),
                hosts: vec![id.clone()],
                total_bytes: 2048 * GIB,
                free_bytes: ((i as u64 + d) % 100 + 1) * 20 * GIB,
                enabled: true,
            });
        }
    }
    Arc::new(InventorySnapshot::new(host_list, storages, Vec::new()))
}

fn balancers(kind: BalancerKind, hosts: usize) -> PlacementBalancers {
    let mut host = BalancerSection::new(kind)
        .with_strategy(Strategy::LeastLoaded)
        .with_weights(Weights {
            cpu: 1.0,
            memory: 1.0,
            vm_count: 0.5,
        });
    for i in 0..hosts {
        host = host.with_element(BalancerElement::new(format!("esx-{:04}", i)));
    }
    let storage =
        BalancerSection::new(BalancerKind::Storage).with_default_limit(Limit::Percent(10.0));

    let document = BalancerDocument { host, storage };
    match PlacementBalancers::from_document(&document) {
        Ok(balancers) => balancers,
        Err(e) => panic!("invalid benchmark configuration: {}", e),
    }
}

fn bench_select_host(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_host");
    group.throughput(Throughput::Elements(1));

    for hosts in [10usize, 100, 1000] {
        let snapshot = inventory(hosts);
        let settings = ProvisioningSettings::new();

        for kind in [BalancerKind::Equipartition, BalancerKind::DynamicEquipartition] {
            let placement = balancers(kind, hosts);
            placement.set_inventory(snapshot.clone());

            group.bench_with_input(
                BenchmarkId::new(kind.to_string(), hosts),
                &hosts,
                |b, _| {
                    b.iter(|| {
                        let _ = placement.select_host(black_box(&settings));
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_select_storage(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_storage");
    group.throughput(Throughput::Elements(1));

    let placement = balancers(BalancerKind::DynamicEquipartition, 100);
    placement.set_inventory(inventory(100));

    let mut settings = ProvisioningSettings::new();
    settings.set(keys::HOST, "esx-0042");
    settings.set(keys::DISK_SIZE_GB, "40");

    group.bench_function("storage_on_host", |b| {
        b.iter(|| {
            let _ = placement.select_storage(black_box(&settings));
        });
    });

    group.finish();
}

fn bench_inventory_swap(c: &mut Criterion) {
    let mut group = c.benchmark_group("inventory_swap");
    group.throughput(Throughput::Elements(1));

    let placement = balancers(BalancerKind::DynamicEquipartition, 1000);
    let snapshot = inventory(1000);

    group.bench_function("set_inventory_1000_hosts", |b| {
        b.iter(|| {
            placement.set_inventory(black_box(snapshot.clone()));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_select_host,
    bench_select_storage,
    bench_inventory_swap,
);
criterion_main!(benches);
