#![cfg_attr(
    all(not(debug_assertions), target_os = "windows"),
    windows_subsystem = "windows"
)]

/// `--instance <name>` (or `-i <name>`) runs a headless launch of the
/// named instance instead of starting the UI.
fn parse_instance_flag(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--instance" || arg == "-i" {
            return iter.next().cloned();
        }
    }
    None
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if let Some(instance_name) = parse_instance_flag(&args) {
        let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
        let exit_code = runtime.block_on(meridian_lib::run_headless(instance_name));
        std::process::exit(exit_code);
    }

    meridian_lib::run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_flag_both_spellings() {
        let long: Vec<String> = ["app", "--instance", "Skyblock"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(parse_instance_flag(&long).as_deref(), Some("Skyblock"));

        let short: Vec<String> = ["app", "-i", "T"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_instance_flag(&short).as_deref(), Some("T"));

        let none: Vec<String> = ["app"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_instance_flag(&none), None);
    }
}
