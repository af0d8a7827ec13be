// FIFO server binary.
//
// Parses the queue size, worker count, and port, binds the listening socket,
// installs a Ctrl+C handler that tears the active connection down, and then
// processes exactly one client connection to completion.

use fifo_server::{Server, ServerConfig};
use fifo_server::server::USAGE;
use std::process;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            process::exit(1);
        }
    };

    println!("INFO: setting server port as: {}", config.port);

    let server = Server::bind(config)?;

    // Ctrl+C flips the stop flag and shuts the active connection down, which
    // unblocks the handler's read and runs the normal termination path.
    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || shutdown.shutdown())?;

    server.run()?;
    Ok(())
}
