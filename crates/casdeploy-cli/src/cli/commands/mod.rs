use super::args::*;

pub mod apply;
pub mod cache_device;
pub mod context;
pub mod core_device;
pub mod facts;
pub mod ioclass;
pub(crate) mod output;
pub mod reset;
pub mod stop;

use crate::exit_codes::EXIT_SUCCESS;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let format = cli.format;
    match cli.cmd {
        Command::Facts => facts::run(&cli.engine, format),
        Command::Reset => reset::run(&cli.engine, format),
        Command::Stop(args) => stop::run(&cli.engine, args, format),
        Command::Cache(args) => cache_device::run(&cli.engine, args.cmd, format),
        Command::Core(args) => core_device::run(&cli.engine, args.cmd, format),
        Command::Ioclass(args) => ioclass::run(args.cmd, format),
        Command::Apply(args) => apply::run(&cli.engine, args, format),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(EXIT_SUCCESS)
        }
    }
}
