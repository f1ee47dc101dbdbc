fn main() {
    if let Err(err) = facturas_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
