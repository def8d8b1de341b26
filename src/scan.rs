use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use jclassfile::class_file;
use tracing::{debug, info};
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

use crate::classfile::parse_class;
use crate::ir::ClassModel;

/// Non-class archive entry, copied to the output unchanged.
pub(crate) struct Resource {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
}

/// Classes in archive order plus the resources to carry over.
pub(crate) struct ScanOutput {
    pub(crate) classes: Vec<ClassModel>,
    pub(crate) resources: Vec<Resource>,
}

pub(crate) fn scan_input(input: &Path) -> Result<ScanOutput> {
    let mut output = ScanOutput {
        classes: Vec::new(),
        resources: Vec::new(),
    };
    let extension = input.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => scan_class_file(input, &mut output)?,
        "jar" | "zip" => scan_jar_file(input, &mut output)?,
        _ => anyhow::bail!("unsupported input file: {}", input.display()),
    }
    info!(
        "loaded {} classes and {} resources from {}",
        output.classes.len(),
        output.resources.len(),
        input.display()
    );
    Ok(output)
}

fn scan_class_file(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    output
        .classes
        .push(load_class(&data).with_context(|| format!("failed to parse {}", path.display()))?);
    Ok(())
}

/// Entries are taken in archive order; the main class heuristic depends on it.
fn scan_jar_file(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;

        if is_signature_file(&name) {
            debug!("dropping signature file {}", name);
        } else if name.ends_with(".class") && !name.ends_with("module-info.class") {
            let class = load_class(&data)
                .with_context(|| format!("failed to parse {}:{}", path.display(), name))?;
            output.classes.push(class);
        } else {
            output.resources.push(Resource { name, data });
        }
    }

    Ok(())
}

fn load_class(data: &[u8]) -> Result<ClassModel> {
    class_file::parse(data).context("class file rejected by validator")?;
    parse_class(data)
}

/// Signatures cover the original class bytes and no longer verify once
/// classes are rewritten.
fn is_signature_file(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    !file.contains('/')
        && [".SF", ".RSA", ".DSA", ".EC"]
            .iter()
            .any(|suffix| file.to_ascii_uppercase().ends_with(suffix))
}

/// Write encoded classes as `<name>.class` entries followed by the resources.
/// A `.class` output path takes the single class of a class file input.
pub(crate) fn write_output(
    path: &Path,
    classes: &[(String, Vec<u8>)],
    resources: &[Resource],
) -> Result<()> {
    if path.extension().and_then(|ext| ext.to_str()) == Some("class") {
        let [(_, data)] = classes else {
            anyhow::bail!(
                "cannot write {} classes to {}",
                classes.len(),
                path.display()
            );
        };
        return fs::write(path, data).with_context(|| format!("failed to write {}", path.display()));
    }

    let file =
        fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, data) in classes {
        let entry = format!("{name}.class");
        writer
            .start_file(entry.as_str(), options)
            .with_context(|| format!("failed to add {} to {}", entry, path.display()))?;
        writer
            .write_all(data)
            .with_context(|| format!("failed to write {}:{}", path.display(), entry))?;
    }
    for resource in resources {
        writer
            .start_file(resource.name.as_str(), options)
            .with_context(|| format!("failed to add {} to {}", resource.name, path.display()))?;
        writer
            .write_all(&resource.data)
            .with_context(|| format!("failed to write {}:{}", path.display(), resource.name))?;
    }
    writer
        .finish()
        .with_context(|| format!("failed to finish {}", path.display()))?;
    Ok(())
}
