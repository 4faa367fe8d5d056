//! Report tree rendering

use colored::Colorize;
use mothball_task::{TaskReport, TaskStatus};

pub fn print_report(report: &TaskReport) {
    print_node(report, 0);
}

fn print_node(node: &TaskReport, depth: usize) {
    let indent = "  ".repeat(depth);
    let glyph = match node.status {
        TaskStatus::Succeeded => "✓".green(),
        TaskStatus::Failed => "✗".red(),
        TaskStatus::Skipped => "↷".yellow(),
        TaskStatus::Pending | TaskStatus::Running => "…".dimmed(),
    };

    match &node.detail {
        Some(detail) if node.status == TaskStatus::Failed => {
            println!("{indent}{glyph} {}: {}", node.title, detail.red());
        }
        Some(detail) => {
            println!("{indent}{glyph} {} ({})", node.title, detail.dimmed());
        }
        None => {
            println!("{indent}{glyph} {}", node.title);
        }
    }

    for child in &node.children {
        print_node(child, depth + 1);
    }
}
