use colored::Colorize;
use mothball_core::TrickRegistry;

pub fn handle(registry: &TrickRegistry) {
    println!(
        "{}",
        format!("Registered tricks ({}):", registry.len()).bold()
    );
    for trick in registry.all() {
        let mode = if trick.can_be_concurrent() {
            "concurrent"
        } else {
            "sequential"
        };
        println!(
            "  • {} {} ({})",
            trick.machine_name().cyan(),
            trick.display_name(),
            mode.dimmed()
        );
    }
}
