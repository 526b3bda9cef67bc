// Criterion benchmarks for trible-client load balancers
//
// Run benchmarks with:
//   cargo bench -p trible-client

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trible_client::load_balancer::request_attributes;
use trible_client::{
    ConsistentHashLoadBalancer, LoadBalancer, RandomLoadBalancer, RoundRobinLoadBalancer,
    ServiceInstance,
};

fn candidates(count: usize) -> Vec<ServiceInstance> {
    (0..count)
        .map(|i| ServiceInstance::new("Catalog", format!("10.0.0.{i}"), 9000))
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    let attributes = request_attributes("Catalog", "lookup");

    let balancers: [(&str, Box<dyn LoadBalancer>); 3] = [
        ("random", Box::new(RandomLoadBalancer::new())),
        ("round_robin", Box::new(RoundRobinLoadBalancer::new())),
        ("consistent_hash", Box::new(ConsistentHashLoadBalancer::new())),
    ];

    for count in [2usize, 16, 128] {
        let nodes = candidates(count);
        for (name, balancer) in &balancers {
            group.bench_with_input(BenchmarkId::new(*name, count), &nodes, |b, nodes| {
                b.iter(|| balancer.select(black_box(&attributes), black_box(nodes)));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_select);
criterion_main!(benches);
