//! Micro-benchmark of the candidate-router sort (§1A).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vidforge::domain::models::{Model, Provider, ProviderCapabilities, RoutingStrategy};
use vidforge::services::provider_router::{select_candidates, RouteConstraints};

fn provider(id: &str, priority: u32) -> Provider {
    Provider {
        id: id.to_string(),
        display_name: id.to_string(),
        enabled: true,
        priority,
        weight: 1,
        capabilities: ProviderCapabilities { supports_image_to_video: true, supported_durations: vec![4, 8, 10, 12, 15, 25], supported_resolutions: vec!["horizontal".to_string(), "vertical".to_string()], supports_pro: true },
    }
}

fn model(providers: &[Provider]) -> Model {
    let provider_map = providers.iter().map(|p| (p.id.clone(), vec![format!("{}-model", p.id)])).collect::<Vec<_>>();
    Model { id: "bench-model".to_string(), display_name: "bench".to_string(), description: String::new(), enabled: true, provider_map }
}

fn bench_select_candidates(c: &mut Criterion) {
    let providers: Vec<Provider> = (0..50).map(|i| provider(&format!("p{i}"), u32::try_from(50 - i).unwrap())).collect();
    let model = model(&providers);
    let constraints = RouteConstraints { required_durations: vec![10], required_resolutions: vec!["horizontal".to_string()], requires_pro: false, requires_image_to_video: false };

    c.bench_function("select_candidates_default_50_providers", |b| {
        b.iter(|| select_candidates(black_box(&model), black_box(&providers), black_box(&constraints), black_box(RoutingStrategy::Default)));
    });

    c.bench_function("select_candidates_weighted_50_providers", |b| {
        b.iter(|| select_candidates(black_box(&model), black_box(&providers), black_box(&constraints), black_box(RoutingStrategy::Weighted)));
    });
}

criterion_group!(benches, bench_select_candidates);
criterion_main!(benches);
