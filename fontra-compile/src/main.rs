use std::io::Write;

use clap::Parser;
use fontra_compile::{driver::ExternalCompiler, workflow::Workflow, Args, Error};
use log::warn;

fn main() -> Result<(), Error> {
    env_logger::builder()
        .format(|buf, record| {
            let ts = buf.timestamp_micros();
            let style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "{}: {:?}: {style}{}{style:#}: {}",
                ts,
                std::thread::current().id(),
                record.level(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let workflow = Workflow::load(&args.workflow)?;
    let failures = workflow.run(&args.output_dir, args.continue_on_error, &ExternalCompiler)?;
    if !failures.is_empty() {
        warn!("{failures}");
    }
    Ok(())
}
