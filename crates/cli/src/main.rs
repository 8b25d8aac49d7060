fn main() {
    markup_cli::init_tracing();
    if let Err(error) = markup_cli::run(std::env::args_os()) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}
