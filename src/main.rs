fn main() {
    if let Err(e) = boxsight::run() {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
