fn main() {
    if let Err(err) = shiftlog_bot::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
