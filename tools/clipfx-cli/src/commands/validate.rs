//! Validate a ClipFX project file.

use std::path::PathBuf;

use super::load_project;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating project at: {}", path.display());

    let project = load_project(&path)?;

    println!("  Name: {}", project.name);
    println!("  Version: {}", project.version);
    println!(
        "  Preview: {}x{}",
        project.source.preview_width, project.source.preview_height
    );
    println!(
        "  Edit range: {:.3}s - {:.3}s",
        project.edit_range.start, project.edit_range.end
    );
    println!("  Filters: {}", project.filters.len());

    let source = project.resolve_source(&path);
    let mut errors = project.validate();
    if !source.exists() {
        errors.push(format!("Source file not found: {}", source.display()));
    }

    if errors.is_empty() {
        println!("  Source: {}", source.display());
        println!("\nProject is valid.");
    } else {
        println!("\nValidation issues:");
        for error in &errors {
            println!("  - {error}");
        }
        println!(
            "\n{} issue(s) found. Project will not export until fixed.",
            errors.len()
        );
    }

    Ok(())
}
