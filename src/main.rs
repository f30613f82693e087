fn main() {
    if let Err(err) = triagegrid::cli::run() {
        triagegrid::ui::eprintln_error(&err);
        std::process::exit(triagegrid::exit::exit_code(&err));
    }
}
