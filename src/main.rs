fn main() {
    if let Err(err) = star_loader::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
