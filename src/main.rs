fn main() {
    if let Err(e) = docuagent::run() {
        eprintln!("{}: {e}", docuagent::config::APP_NAME);
        std::process::exit(1);
    }
}
