use clap::Parser;

use koozic_installer::cli::Cli;
use koozic_installer::installation::linux::require_root;

fn main() {
    if let Err(e) = require_root() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    let cli = Cli::parse();

    // Strictly sequential work: one thread is enough.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(koozic_installer::run(cli));
    if let Err(e) = result {
        log::error!("[PHASE: fatal] [STEP: exit] {:#}", e);
        log::logger().flush();
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    log::logger().flush();
}
