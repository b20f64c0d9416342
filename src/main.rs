fn main() {
    if let Err(e) = toxedit_lib::run() {
        eprintln!("toxedit: {e}");
        std::process::exit(1);
    }
}
