use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use num::complex::Complex64;

use mm_core::context::ComputeContext;
use mm_core::mandel::Mandel;
use mm_core::Size;
use mm_sched::{MandelJob, QueueAs, Scheduler, SchedulerEvent};

mod color;

/// Render one view of the Mandelbrot set to a PNG.
#[derive(Debug, Parser)]
struct Args {
    /// Real part of the view centre.
    #[arg(long, default_value_t = -0.8, allow_hyphen_values = true)]
    re: f64,
    /// Imaginary part of the view centre.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    im: f64,
    /// Extent of the smaller image dimension in the complex plane.
    #[arg(long, default_value_t = 3.0)]
    size: f64,
    #[arg(long, default_value_t = 1024)]
    width: usize,
    #[arg(long, default_value_t = 768)]
    height: usize,
    /// Rotation of the view, in counterclockwise degrees.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    theta: f64,
    #[arg(long, default_value_t = 10000)]
    max_iterations: u32,
    /// Output PNG path.
    #[arg(long, default_value = "mandel.png")]
    out: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let view = Mandel::new(
        Complex64::new(args.re, args.im),
        Size {
            x: args.width,
            y: args.height,
        },
        args.size,
        args.theta,
        args.max_iterations,
    )?;

    let ctx = Arc::new(ComputeContext::auto());
    let scheduler = Scheduler::new()?;
    scheduler.request_job(MandelJob::new(ctx, view), QueueAs::Singular)?;

    // One job, one completion; Progress events drive the console readout.
    let mut last_percent = 0u32;
    let done = loop {
        match scheduler.events().recv()? {
            SchedulerEvent::Progress { progress, .. } => {
                let percent = (progress * 100.0) as u32;
                if percent > last_percent {
                    last_percent = percent;
                    tracing::info!(percent, "computing");
                }
            }
            SchedulerEvent::Complete { job, .. } => break job.into_mandel(),
            SchedulerEvent::Failed { error, .. } => return Err(error.into()),
            SchedulerEvent::ActiveChange(_) | SchedulerEvent::StopSuccess => {}
        }
    };

    let iteration = done
        .iteration
        .as_ref()
        .ok_or("calculation produced no iteration buffer")?;
    tracing::info!(
        iterations_per_pixel = done.iterations_per_pixel,
        max_iteration = done.max_iteration,
        final_iteration = done.final_iteration,
        "calculation finished"
    );
    let image = color::Renderer::default().render(iteration, done.max_iterations)?;
    image.save(&args.out)?;
    println!("wrote {}", args.out.display());
    Ok(())
}
