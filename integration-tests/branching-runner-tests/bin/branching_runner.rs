use ixa_branching::runner::run_with_args;

fn main() {
    if let Err(e) = run_with_args() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
