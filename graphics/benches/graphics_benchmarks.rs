use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use tether_graphics::{
    DummyBackend, LightBuilder, LightDescriptor, LightKind, ResourceConfig, ResourceFactory,
    ResourceGroupDescriptor, SceneDescriptor,
};

fn dummy_factory() -> ResourceFactory {
    ResourceFactory::new(ResourceConfig::default(), Arc::new(DummyBackend::new())).unwrap()
}

// ---------------------------------------------------------------------------
// Dependency tracking
// ---------------------------------------------------------------------------

fn bench_scene_add_remove(c: &mut Criterion) {
    let factory = dummy_factory();
    let scene = factory
        .scenes()
        .create_scene(&SceneDescriptor::new())
        .unwrap();
    let lights: Vec<_> = (0..16)
        .map(|_| {
            factory
                .lights()
                .create_light(&LightDescriptor::new(LightKind::Point))
                .unwrap()
        })
        .collect();

    c.bench_function("scene_add_remove_16_lights", |b| {
        b.iter(|| {
            for light in &lights {
                scene.add_light(black_box(light)).unwrap();
            }
            for light in &lights {
                scene.remove_light(black_box(light)).unwrap();
            }
        });
    });
}

fn bench_typed_enumeration(c: &mut Criterion) {
    let factory = dummy_factory();
    let group = factory
        .groups()
        .create_group(&ResourceGroupDescriptor::new())
        .unwrap();
    for i in 0..64 {
        let kind = if i % 2 == 0 {
            LightKind::Point
        } else {
            LightKind::Spot
        };
        let light = factory
            .lights()
            .create_light(&LightDescriptor::new(kind))
            .unwrap();
        group.add(&light).unwrap();
        let scene = factory
            .scenes()
            .create_scene(&SceneDescriptor::new())
            .unwrap();
        group.add(&scene).unwrap();
    }
    let tracker = factory.dependency_tracker();

    c.bench_function("group_lights_of_128_members", |b| {
        b.iter(|| {
            let lights = tracker.targets_of_type::<LightBuilder>(&group).unwrap();
            for light in &lights {
                black_box(light.unwrap());
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Disposal
// ---------------------------------------------------------------------------

fn bench_create_dispose_light(c: &mut Criterion) {
    let factory = dummy_factory();
    let descriptor = LightDescriptor::new(LightKind::Directional).with_label("Sun");

    c.bench_function("light_create_dispose_advance", |b| {
        b.iter(|| {
            let light = factory.lights().create_light(&descriptor).unwrap();
            light.dispose().unwrap();
            black_box(factory.advance_frame().unwrap());
        });
    });
}

fn bench_advance_idle_frame(c: &mut Criterion) {
    let factory = dummy_factory();
    c.bench_function("advance_empty_frame", |b| {
        b.iter(|| black_box(factory.advance_frame().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_scene_add_remove,
    bench_typed_enumeration,
    bench_create_dispose_light,
    bench_advance_idle_frame,
);
criterion_main!(benches);
