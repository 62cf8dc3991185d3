//! binast entry point.

fn main() {
    if let Err(e) = binast::cli::run_cli() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
