use nvticache::application::Application;

use log::error;
use simple_logger::SimpleLogger;
use std::process;

fn main() {
    let application = Application::new();
    if let Err(e) = SimpleLogger::new()
        .with_level(application.argv().log_level)
        .init()
    {
        eprintln!("Unable to initialize the logger: {}", e);
    }

    if let Err(e) = application.run() {
        error!("{}", e);
        eprintln!("{}", e);
        process::exit(1);
    }
}
