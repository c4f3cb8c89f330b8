//! Scenario dry run.

use std::path::PathBuf;

use anyhow::Context;
use audren_config::Scenario;
use audren_core::{AudioRenderer, PoolMapper, RenderPlan, RenderStep};
use clap::Args;

#[derive(Args)]
pub struct SimulateArgs {
    /// Scenario file, or the name of one in the user scenarios directory
    scenario: String,

    /// Print every step of each frame's render plan
    #[arg(long)]
    plan: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<usize>,
}

fn resolve(name: &str) -> anyhow::Result<PathBuf> {
    audren_config::paths::find_scenario(name)
        .with_context(|| format!("scenario '{name}' not found"))
}

fn print_plan(plan: &RenderPlan) {
    for step in &plan.steps {
        match step {
            RenderStep::SubMix {
                mix,
                buffer_offset,
                buffer_count,
                effects,
                destination,
            } => {
                let destination = destination.map_or_else(|| "-".to_string(), |d| d.to_string());
                println!(
                    "    sub-mix {mix:>3}  buffers {buffer_offset}+{buffer_count}  effects {effects:?}  -> {destination}"
                );
            }
            RenderStep::FinalMix {
                buffer_offset,
                buffer_count,
                effects,
            } => {
                println!("    final-mix    buffers {buffer_offset}+{buffer_count}  effects {effects:?}");
            }
            RenderStep::Sink {
                sink,
                node_id,
                upsampler,
            } => {
                let upsampler = upsampler.map_or_else(|| "-".to_string(), |u| format!("{u:?}"));
                println!("    sink    {sink:>3}  node {node_id}  upsampler {upsampler}");
            }
        }
    }
}

pub fn run(args: SimulateArgs) -> anyhow::Result<()> {
    let path = resolve(&args.scenario)?;
    let scenario =
        Scenario::load(&path).with_context(|| format!("loading {}", path.display()))?;
    scenario
        .config
        .validate()
        .context("invalid scenario configuration")?;

    let mut mapper = PoolMapper::new();
    for pool in &scenario.pools {
        mapper.register(pool.cpu_address, pool.dsp_address, pool.size);
    }

    let parameters = scenario.config.renderer.to_parameters();
    let mut renderer = AudioRenderer::new(&parameters, mapper)?;
    renderer.start();

    let mut frames = scenario.frames()?;
    if let Some(limit) = args.frames {
        frames.truncate(limit);
    }

    println!("Scenario: {}", path.display());
    println!(
        "Renderer: {} Hz, {} samples/frame, {} mixes, {} effects, {} sinks, revision {}",
        parameters.sample_rate,
        parameters.sample_count,
        parameters.mix_count(),
        parameters.effect_count,
        parameters.sink_count,
        parameters.revision
    );
    println!();

    let mut error_total = 0;
    for (index, frame) in frames.iter().enumerate() {
        let output = renderer
            .update(&frame.input())
            .with_context(|| format!("frame {index}"))?;
        let plan = renderer.generate_plan();
        error_total += output.errors.len();

        println!(
            "frame {index:>4}: resorted={} errors={} order={:?} sinks={:?}",
            output.resorted,
            output.errors.len(),
            plan.sub_mix_order(),
            plan.sink_order()
        );
        for error in &output.errors {
            println!("    error {:?} (0x{:x})", error.code, error.extra);
        }
        if args.plan {
            print_plan(&plan);
        }
    }

    renderer.stop();
    println!();
    println!(
        "Simulated {} frame(s), {} absorbed error(s)",
        frames.len(),
        error_total
    );
    Ok(())
}
