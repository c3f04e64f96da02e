use crate::ast::{tokenize, EvaluationContext, Evaluator, Expression, FunctionId, Parser};
use crate::registry::{Axis, FunctionEntry, FunctionRegistry, Registry};
use log::debug;
use rayon::prelude::*;

/// Tunables for a sampling pass.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Evaluations per curve, one per screen column in a typical viewport.
    pub samples: usize,
    /// Largest step between neighbouring outputs still drawn as connected.
    pub jump_tolerance: f64,
    /// Tighter tolerance for curves that went through `floor` or `ceil`.
    pub stepped_jump_tolerance: f64,
    /// Below this many samples a curve is evaluated on the calling thread.
    pub parallel_threshold: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            samples: 1920,
            jump_tolerance: 5.0,
            stepped_jump_tolerance: 0.5,
            parallel_threshold: 256,
        }
    }
}

/// Interval of the bound variable covered by a curve.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SampleRange {
    pub start: f64,
    pub end: f64,
}

impl SampleRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Input of sample `index` out of `samples` evenly spaced ones, both ends included.
    pub fn input_at(&self, index: usize, samples: usize) -> f64 {
        if samples <= 1 {
            return self.start;
        }
        let step = (self.end - self.start) / (samples - 1) as f64;
        self.start + index as f64 * step
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sample {
    pub input: f64,
    /// `None` when the evaluation failed and the point must be skipped.
    pub output: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub function: Option<FunctionId>,
    pub axis: Axis,
    pub samples: Vec<Sample>,
    pub used_floor_or_ceil: bool,
    pub broken: bool,
}

impl Curve {
    /// Number of samples with a value.
    pub fn defined(&self) -> usize {
        self.samples
            .iter()
            .filter(|sample| sample.output.is_some())
            .count()
    }

    /// Plane coordinates `(x, y)` of the defined samples.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let axis = self.axis;
        self.samples.iter().filter_map(move |sample| {
            let output = sample.output?;
            Some(match axis {
                Axis::X => (sample.input, output),
                Axis::Y => (output, sample.input),
            })
        })
    }

    pub fn jump_tolerance(&self, config: &SamplerConfig) -> f64 {
        if self.used_floor_or_ceil {
            config.stepped_jump_tolerance
        } else {
            config.jump_tolerance
        }
    }

    /// Runs of defined samples whose neighbouring outputs differ by at most
    /// `tolerance`.
    pub fn segments(&self, tolerance: f64) -> Vec<&[Sample]> {
        let mut segments = Vec::new();
        let mut start = None;

        for (i, sample) in self.samples.iter().enumerate() {
            let Some(output) = sample.output else {
                if let Some(begin) = start.take() {
                    segments.push(&self.samples[begin..i]);
                }
                continue;
            };

            match start {
                None => start = Some(i),
                Some(begin) => {
                    let jumped = self.samples[i - 1]
                        .output
                        .is_some_and(|previous| (output - previous).abs() > tolerance);
                    if jumped {
                        segments.push(&self.samples[begin..i]);
                        start = Some(i);
                    }
                }
            }
        }

        if let Some(begin) = start {
            segments.push(&self.samples[begin..]);
        }
        segments
    }
}

/// Evaluates formulas across a range of inputs.
pub struct Sampler<'r, R: FunctionRegistry + Sync + ?Sized> {
    registry: &'r R,
    evaluator: Evaluator<'r, R>,
    config: SamplerConfig,
}

impl<'r, R: FunctionRegistry + Sync + ?Sized> Sampler<'r, R> {
    pub fn new(registry: &'r R, config: SamplerConfig) -> Self {
        Self {
            registry,
            evaluator: Evaluator::new(registry),
            config,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Samples a free-standing formula, or one owned by `owner`.
    pub fn sample_formula(
        &self,
        formula: &str,
        owner: Option<FunctionId>,
        range: SampleRange,
    ) -> Curve {
        let mut parser = Parser::new(tokenize(formula));
        let expression = parser.parse();
        self.sample_expression(&expression, owner, Axis::X, range)
    }

    /// Samples a registry entry against its own axis.
    pub fn sample_entry(&self, entry: &FunctionEntry, range: SampleRange) -> Curve {
        let formula = entry.canonical_formula();
        let mut parser = Parser::new(tokenize(&formula));
        let expression = parser.parse();
        self.sample_expression(&expression, Some(entry.id), entry.axis, range)
    }

    /// Samples an already parsed expression.
    ///
    /// Every sample starts from a clean context; parsed cross-references are
    /// kept per worker for the duration of this call.
    pub fn sample_expression(
        &self,
        expression: &Expression,
        owner: Option<FunctionId>,
        axis: Axis,
        range: SampleRange,
    ) -> Curve {
        let count = self.config.samples;

        if expression.is_broken() {
            debug!("Skipping broken formula {:?}", owner);
            return Curve {
                function: owner,
                axis,
                samples: (0..count)
                    .map(|i| Sample {
                        input: range.input_at(i, count),
                        output: None,
                    })
                    .collect(),
                used_floor_or_ceil: false,
                broken: true,
            };
        }

        let evaluate = |context: &mut EvaluationContext, i: usize| {
            let input = range.input_at(i, count);
            context.reset(input);
            let evaluation = self.evaluator.evaluate_with(expression, context);
            (
                Sample {
                    input,
                    output: evaluation.value(),
                },
                evaluation.used_floor_or_ceil,
            )
        };

        let results: Vec<(Sample, bool)> = if count >= self.config.parallel_threshold {
            (0..count)
                .into_par_iter()
                .map_init(|| EvaluationContext::new(range.start, owner), evaluate)
                .collect()
        } else {
            let mut context = EvaluationContext::new(range.start, owner);
            (0..count).map(|i| evaluate(&mut context, i)).collect()
        };

        let used_floor_or_ceil = results.iter().any(|(_, used)| *used);
        let samples: Vec<Sample> = results.into_iter().map(|(sample, _)| sample).collect();
        debug!(
            "Sampled {:?}: {} of {} points defined",
            owner,
            samples.iter().filter(|sample| sample.output.is_some()).count(),
            count
        );

        Curve {
            function: owner,
            axis,
            samples,
            used_floor_or_ceil,
            broken: false,
        }
    }
}

impl<'r> Sampler<'r, Registry> {
    /// Samples every entry of the registry the sampler was built on, in
    /// registry order.
    pub fn sample_all(&self, range: SampleRange) -> Vec<Curve> {
        self.registry
            .entries()
            .par_iter()
            .map(|entry| self.sample_entry(entry, range))
            .collect()
    }
}
