// Translation driver: walks a registry of rule-class sources, rewrites
// each rule once, pulls in base classes that carry the transition
// method, and assembles the generated artifacts.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::assemble::{self, AssemblyOptions};
use crate::ast::Node;
use crate::imports::ImportExtractor;
use crate::parser::parse_module;
use crate::rewrite::{Diagnostic, DiagnosticKind, Rewriter, UsageFlags};
use crate::{Result, TranslateError};

/// One rule class available for translation.
#[derive(Debug, Clone)]
pub struct RuleSource {
    /// Class name of the rule type.
    pub class_name: String,
    /// Source fragment containing the class definition.
    pub fragment: String,
    /// Full text of the file the class came from, scanned for imports.
    /// When absent the fragment itself is scanned.
    pub module_source: Option<String>,
}

impl RuleSource {
    pub fn new(class_name: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fragment: fragment.into(),
            module_source: None,
        }
    }

    pub fn with_module_source(mut self, source: impl Into<String>) -> Self {
        self.module_source = Some(source.into());
        self
    }
}

/// The generated artifacts plus everything observed along the way.
#[derive(Debug)]
pub struct Translation {
    pub agent_file: String,
    pub agent_source: String,
    pub model_file: String,
    pub model_source: String,
    pub support_file: String,
    pub support_source: String,
    /// Top-level rule types, in translation order; these become the
    /// scheduler stages and the per-agent rule instances.
    pub rule_names: Vec<String>,
    /// Every translated class, bases included.
    pub all_rules: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub flags: UsageFlags,
}

/// Translates registered rule sources into the generated agent and
/// model artifacts. The translator itself is reusable; every `translate`
/// call is an isolated run with fresh flags and diagnostics.
#[derive(Debug, Default)]
pub struct Translator {
    registry: IndexMap<String, RuleSource>,
    extractor: ImportExtractor,
}

impl Translator {
    pub fn new() -> Self {
        Self {
            registry: IndexMap::new(),
            extractor: ImportExtractor::default(),
        }
    }

    pub fn with_extractor(extractor: ImportExtractor) -> Self {
        Self {
            registry: IndexMap::new(),
            extractor,
        }
    }

    /// Register a rule class source. Base classes a rule inherits its
    /// transition method from must be registered as well.
    pub fn register(&mut self, source: RuleSource) {
        self.registry.insert(source.class_name.clone(), source);
    }

    /// Translate the named top-level rules (plus any base classes they
    /// pull in) and assemble the generated artifacts.
    pub fn translate(&self, top_level: &[&str], opts: &AssemblyOptions) -> Result<Translation> {
        let mut run = Run {
            translator: self,
            flags: UsageFlags::new(),
            diagnostics: Vec::new(),
            done: HashSet::new(),
            blocks: Vec::new(),
            imports: IndexSet::new(),
            all_rules: Vec::new(),
        };

        let mut rule_names = Vec::new();
        for name in top_level {
            if !self.registry.contains_key(*name) {
                return Err(TranslateError::Config(format!(
                    "rule source for {name} is not registered"
                )));
            }
            run.translate_rule(name)?;
            if !rule_names.iter().any(|n| n == name) {
                rule_names.push((*name).to_string());
            }
        }

        let rules_code = run.blocks.join("\n\n");
        let agent_source = assemble::agent_class_source(
            opts,
            &rules_code,
            &rule_names,
            &run.imports,
            &run.flags,
        );
        let model_source = assemble::model_class_source(opts, &rule_names, &run.flags);

        Ok(Translation {
            agent_file: format!("{}.py", opts.agent_class()),
            agent_source,
            model_file: format!("{}.py", opts.model_class()),
            model_source,
            support_file: "make_python_identifier.py".to_string(),
            support_source: assemble::support_module_source().to_string(),
            rule_names,
            all_rules: run.all_rules,
            diagnostics: run.diagnostics,
            flags: run.flags,
        })
    }
}

/// State of one translation run.
struct Run<'a> {
    translator: &'a Translator,
    flags: UsageFlags,
    diagnostics: Vec<Diagnostic>,
    done: HashSet<String>,
    blocks: Vec<String>,
    imports: IndexSet<String>,
    all_rules: Vec<String>,
}

impl Run<'_> {
    /// Translate one rule class, recursing into registered bases first
    /// when the class has no local transition method. Each distinct
    /// rule type is translated once.
    fn translate_rule(&mut self, name: &str) -> Result<()> {
        if !self.done.insert(name.to_string()) {
            return Ok(());
        }
        let Some(source) = self.translator.registry.get(name) else {
            self.diagnostics.push(Diagnostic {
                kind: DiagnosticKind::Advisory,
                message: format!(
                    "base class {name} is not registered; its definition must come from \
                     elsewhere"
                ),
            });
            return Ok(());
        };
        debug!(rule = name, "translating rule class");

        let mut tree = parse_module(&source.fragment).map_err(TranslateError::Parse)?;

        // bases carry the transition method when the class itself does
        // not define one; translate them first, the way the emitted file
        // must order the definitions
        for base in self.bases_needing_translation(&tree, name) {
            self.translate_rule(&base)?;
        }

        let mut rewriter = Rewriter::new(&mut tree.arena, tree.root, &mut self.flags);
        rewriter.rewrite_module(tree.root)?;
        self.all_rules.extend(rewriter.rule_names.clone());
        self.diagnostics.append(&mut rewriter.diagnostics);

        self.blocks.push(tree.arena.to_source(tree.root));

        let import_source = source
            .module_source
            .as_deref()
            .unwrap_or(&source.fragment);
        let extracted = self.translator.extractor.extract(import_source);
        self.imports.extend(extracted);
        Ok(())
    }

    /// Base-class names of `class_name` that need their own translation
    /// because the class lacks a local transition method.
    fn bases_needing_translation(
        &self,
        tree: &crate::parser::ParseTree,
        class_name: &str,
    ) -> Vec<String> {
        let Node::Module { body } = tree.arena.node(tree.root) else {
            return vec![];
        };
        for stmt in body {
            let Node::ClassDef { name, bases, body } = tree.arena.node(*stmt) else {
                continue;
            };
            if name != class_name {
                continue;
            }
            let has_apply = body.iter().any(|s| {
                matches!(tree.arena.node(*s), Node::FunctionDef { name, .. } if name == "apply")
            });
            if has_apply {
                return vec![];
            }
            return bases
                .iter()
                .filter_map(|b| match tree.arena.node(*b) {
                    Node::Name(n) => Some(n.clone()),
                    _ => None,
                })
                .collect();
        }
        vec![]
    }
}
