use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("agentwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: agentwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("AGENTWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "default_agent: {}",
        agentwire_agent::DEFAULT_AGENT_ADDR
    );
    println!(
        "features: agent={}, async={}, cli=true",
        cfg!(feature = "agent"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
