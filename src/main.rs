fn main() {
    if let Err(err) = northwind_bi::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
