use graphcalc_rs::registry::{Axis, Registry};
use graphcalc_rs::sampler::{SampleRange, Sampler, SamplerConfig};

fn main() {
    pretty_env_logger::init();

    let mut registry = Registry::new();
    registry.push("sin(x)", Axis::X);
    registry.push("floor(x) / 2", Axis::X);
    registry.push("y^2 - 1", Axis::Y);
    registry.push("ln f0(x)", Axis::X);

    let config = SamplerConfig {
        samples: 2001,
        ..Default::default()
    };
    let sampler = Sampler::new(&registry, config);
    let curves = sampler.sample_all(SampleRange::new(-5.0, 5.0));

    for (entry, curve) in registry.iter().zip(&curves) {
        let segments = curve.segments(curve.jump_tolerance(&config));
        println!(
            "f{} = {:?}: {} of {} points, {} segments",
            entry.id,
            entry.formula,
            curve.defined(),
            curve.samples.len(),
            segments.len()
        );
    }
}
