use std::process::ExitCode;

fn main() -> ExitCode {
    match blockoclock::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("blockoclock-host: {error}");
            ExitCode::FAILURE
        }
    }
}
