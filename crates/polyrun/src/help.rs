//! Banner display for the polyrun CLI.

use owo_colors::{OwoColorize, XtermColors};

/// Print the polyrun ASCII art banner.
pub fn print_banner() {
    let blue = XtermColors::from(33);
    let orange = XtermColors::from(208);

    // "poly" in blue, "run" in orange
    println!();
    println!("  {}", "           _".color(blue));
    println!(
        "  {}{}",
        " _ __   ___ | |_   _ ".color(blue),
        "_ __ _   _ _ __".color(orange)
    );
    println!(
        "  {}{}",
        "| '_ \\ / _ \\| | | | |".color(blue),
        " '__| | | | '_ \\".color(orange)
    );
    println!(
        "  {}{}",
        "| |_) | (_) | | |_| |".color(blue),
        " |  | |_| | | | |".color(orange)
    );
    println!(
        "  {}{}",
        "| .__/ \\___/|_|\\__, |".color(blue),
        "_|   \\__,_|_| |_|".color(orange)
    );
    println!("  {}", "|_|            |___/".color(blue));
    println!(
        "  v{} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATE")
    );
    println!();
}

/// Determine if the banner should be shown based on command-line arguments.
pub fn should_show_banner(args: &[String]) -> bool {
    args.len() == 1
        || args.iter().any(|a| a == "--help" || a == "-h")
        || args.iter().any(|a| a == "--version" || a == "-V")
        || (args.len() == 2 && args.iter().any(|a| a == "help"))
}
