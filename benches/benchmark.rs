use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rbac_gate::{Guard, NewUser, RoleSystem, RoleSystemConfigBuilder, UserId, seed::seed_defaults};
use std::hint::black_box;
use std::sync::Arc;

fn seeded(enable_caching: bool) -> (RoleSystem, UserId) {
    let config = RoleSystemConfigBuilder::new()
        .enable_caching(enable_caching)
        .enable_audit(false)
        .build()
        .unwrap();
    let system = RoleSystem::with_config(config);
    seed_defaults(&system).unwrap();
    let user = system
        .create_user(NewUser::new("Bench", "bench@example.com", "hash").role("delegated-admin"))
        .unwrap()
        .id();
    system.give_permission_to_user(user, "view-users").unwrap();
    (system, user)
}

fn bench_authorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("authorize");

    for enable_caching in [true, false] {
        let (system, user) = seeded(enable_caching);
        let label = if enable_caching { "cached" } else { "uncached" };

        group.bench_with_input(BenchmarkId::new("granted", label), &user, |b, &user| {
            b.iter(|| black_box(system.authorize(user, "edit-product").unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("denied", label), &user, |b, &user| {
            b.iter(|| black_box(system.authorize(user, "delete-roles").unwrap()))
        });
    }

    group.finish();
}

fn bench_effective_permissions(c: &mut Criterion) {
    let system = RoleSystem::new();
    let api = Guard::default();

    let names: Vec<String> = (0..200).map(|i| format!("permission-{i}")).collect();
    for name in &names {
        system.create_permission(name, &api).unwrap();
    }
    for chunk in 0..5 {
        let slice: Vec<&str> = names[chunk * 40..(chunk + 1) * 40]
            .iter()
            .map(String::as_str)
            .collect();
        system.create_role(&format!("role-{chunk}"), &api, &slice).unwrap();
    }
    let user = system
        .create_user(
            NewUser::new("Bench", "bench@example.com", "hash")
                .roles((0..5).map(|i| format!("role-{i}"))),
        )
        .unwrap()
        .id();

    c.bench_function("effective_permissions_5_roles", |b| {
        b.iter(|| black_box(system.effective_permissions(user).unwrap()))
    });
}

fn bench_mutation_with_flush(c: &mut Criterion) {
    let (system, user) = seeded(true);

    c.bench_function("assign_revoke_role", |b| {
        b.iter(|| {
            system.assign_role(user, "viewer").unwrap();
            system.revoke_role(user, "viewer").unwrap();
        })
    });
}

fn bench_concurrent_access(c: &mut Criterion) {
    let (system, user) = seeded(true);
    let system = Arc::new(system);

    c.bench_function("concurrent_authorize", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let system = Arc::clone(&system);
                    std::thread::spawn(move || {
                        for _ in 0..100 {
                            black_box(system.authorize(user, "view-product").unwrap());
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_authorize,
    bench_effective_permissions,
    bench_mutation_with_flush,
    bench_concurrent_access
);
criterion_main!(benches);
