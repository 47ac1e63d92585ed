use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Arg, Command};
use disagg_core::{init_tracing, params, AssemblyOptions, RuleSource, Translator};
use serde::Deserialize;

/// One rule entry of the translation manifest.
#[derive(Debug, Deserialize)]
struct ManifestRule {
    class_name: String,
    /// File containing the rule's class definition.
    fragment_file: PathBuf,
    /// File the class came from, scanned for imports. Defaults to the
    /// fragment file.
    #[serde(default)]
    module_file: Option<PathBuf>,
}

/// Translation manifest: which rules to translate and how to name the
/// generated artifacts.
#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    rules: Vec<ManifestRule>,
    /// Rule types instantiated per agent; defaults to every rule listed.
    #[serde(default)]
    top_level: Option<Vec<String>>,
    /// Parameter-record file validated before translation.
    #[serde(default)]
    params_file: Option<PathBuf>,
    /// Optional pre-run group setup source included in the model class.
    #[serde(default)]
    group_setup_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();

    let matches = Command::new("disagg")
        .version(disagg_core::VERSION)
        .about("Translates group-model simulation rules into agent-model transition code")
        .arg(
            Arg::new("manifest")
                .value_name("FILE")
                .help("Translation manifest (JSON)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("out")
                .long("out")
                .value_name("DIR")
                .help("Output directory for the generated files")
                .default_value("."),
        )
        .get_matches();

    let manifest_path = PathBuf::from(matches.get_one::<String>("manifest").unwrap());
    let out_dir = PathBuf::from(matches.get_one::<String>("out").unwrap());

    let manifest_dir = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let manifest: Manifest = serde_json::from_str(
        &fs::read_to_string(&manifest_path)
            .with_context(|| format!("reading manifest {}", manifest_path.display()))?,
    )
    .context("parsing manifest")?;

    // validate the parameter records up front; unknown gate encodings
    // abort before anything is generated
    if let Some(params_file) = &manifest.params_file {
        let path = manifest_dir.join(params_file);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("reading parameter records {}", path.display()))?;
        let records = params::load_records(&json)?;
        println!("Validated {} parameter record(s)", records.len());
    }

    let mut translator = Translator::new();
    let mut names = Vec::new();
    for rule in &manifest.rules {
        let fragment_path = manifest_dir.join(&rule.fragment_file);
        let fragment = fs::read_to_string(&fragment_path)
            .with_context(|| format!("reading rule fragment {}", fragment_path.display()))?;
        let mut source = RuleSource::new(&rule.class_name, fragment);
        if let Some(module_file) = &rule.module_file {
            let module_path = manifest_dir.join(module_file);
            let module = fs::read_to_string(&module_path)
                .with_context(|| format!("reading rule module {}", module_path.display()))?;
            source = source.with_module_source(module);
        }
        names.push(rule.class_name.clone());
        translator.register(source);
    }

    let mut opts = AssemblyOptions::new(&manifest.name);
    if let Some(setup_file) = &manifest.group_setup_file {
        let path = manifest_dir.join(setup_file);
        opts.group_setup = Some(
            fs::read_to_string(&path)
                .with_context(|| format!("reading group setup {}", path.display()))?,
        );
    }

    let top_level: Vec<&str> = match &manifest.top_level {
        Some(list) => list.iter().map(String::as_str).collect(),
        None => names.iter().map(String::as_str).collect(),
    };

    let translation = translator.translate(&top_level, &opts)?;

    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    for (file, source) in [
        (&translation.agent_file, &translation.agent_source),
        (&translation.model_file, &translation.model_source),
        (&translation.support_file, &translation.support_source),
    ] {
        let path = out_dir.join(file);
        fs::write(&path, source).with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    if !translation.diagnostics.is_empty() {
        println!(
            "Translation finished with {} diagnostic(s); see the log for details",
            translation.diagnostics.len()
        );
    }
    println!(
        "Translated {} rule class(es): {}",
        translation.all_rules.len(),
        translation.all_rules.join(", ")
    );

    Ok(())
}
