// Code assembly: merges rewritten rule classes, flag-selected helper
// methods, consolidated imports, and the scaffolding of the generated
// agent and model classes into the final source artifacts.

use indexmap::IndexSet;

use crate::rewrite::{Helper, UsageFlags};

/// File and naming options for one translation.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Base name; generated classes are `<name>Agent` / `<name>Model`.
    pub name: String,
    /// JSON file holding the per-rule-type parameter records.
    pub rule_file: String,
    /// JSON file holding the serialized groups.
    pub group_file: String,
    /// JSON file holding the serialized sites.
    pub site_file: String,
    /// Optional pre-run group setup hook compiled from the source
    /// simulation; included verbatim in the model class when present.
    pub group_setup: Option<String>,
}

impl AssemblyOptions {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            rule_file: format!("{name}Rules.json"),
            group_file: format!("{name}Groups.json"),
            site_file: format!("{name}Sites.json"),
            group_setup: None,
            name,
        }
    }

    pub fn agent_class(&self) -> String {
        format!("{}Agent", self.name)
    }

    pub fn model_class(&self) -> String {
        format!("{}Model", self.name)
    }
}

/// The spelled-out relocation sentinel sometimes survives rewriting in
/// user expressions; the emitted text always uses the quoted form.
fn finalize(code: String) -> String {
    code.replace("Site.AT", "'@'")
}

/// Generated agent class file: query descriptor dataclass, the agent
/// scaffold, flag-gated helpers, and every translated rule class.
pub fn agent_class_source(
    opts: &AssemblyOptions,
    rules_code: &str,
    rule_names: &[String],
    custom_imports: &IndexSet<String>,
    flags: &UsageFlags,
) -> String {
    let class_name = opts.agent_class();
    let imports = custom_imports
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    let protected_rules = rule_names
        .iter()
        .map(|r| format!("'{r}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let rule_declarations = rule_names
        .iter()
        .map(|r| format!("        self.{r} = {r}(self)"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut code = format!(
        r#""""
A custom Agent class for an agent-based simulation.
"""

from mesa import Agent, Model
from .make_python_identifier import make_python_identifier as mpi
from collections.abc import Iterable
from dataclasses import dataclass, field
from typing import Any, List, Dict, Callable
import copy
import dill
import json
# ---- CUSTOM IMPORTS ----
# (many may be extraneous)
{imports}

rule_file = '{rule_file}'


@dataclass
class GroupQry:
    attr: Dict[str, Any] = field(default_factory=dict)
    rel: Dict[str, str] = field(default_factory=dict)
    cond: List[Callable[[Agent], bool]] = field(default_factory=list)
    full: bool = False

    def __post_init__(self):
        # ensure attributes and relations are valid variable names
        self.attr = {{mpi(k): v for k, v in self.attr.items()}}
        self.rel = {{mpi(k): v for k, v in self.rel.items()}}


class {class_name}(Agent):

    _protected = ('model', 'random', 'source_name', 'unique_id', '_attr', '_rel', 'pos',
                  {protected_rules})

    def __init__(self, unique_id, model, attr, rel):
        # the runtime holds agent data (including locations) as plain
        # attributes; only the attribute and relation names are tracked
        # in separate sets, for the query helpers
        self._attr = set()
        self._rel = set()
        super().__init__(unique_id, model)
        for key, value in attr.items():
            setattr(self, key, value)
        for key, value in rel.items():
            s = self.model.site_hashes[value]
            if key == '@':
                self.model.grid.place_agent(self, s)
                self._rel.add('pos')
            else:
                setattr(self, key, s)
        # make (callable) instances of each of our rules
{rule_declarations}

    # __setattr__ tracks attributes vs relations, routes relocation
    # assignments through the grid, and canonicalizes names
    def __setattr__(self, name, value):
        if name in {class_name}._protected:
            object.__setattr__(self, name, value)
            return

        name = mpi(name)

        if value in self.model.grid.G.nodes:
            if name == '_at_sign':
                self.model.grid.move_agent(self, value)
            else:
                object.__setattr__(self, name, value)
                self._rel.add(name)
            return

        object.__setattr__(self, name, value)
        self._attr.add(name)

    # __getattr__ only fires for lookups that failed; fix the name and
    # retry, and answer relocation queries from the grid position
    def __getattr__(self, name):
        mod_name = mpi(name)
        if mod_name == '_at_sign':
            return self.pos

        return object.__getattribute__(self, mod_name)

    def __delattr__(self, name):
        try:
            object.__delattr__(self, name)
        except AttributeError:
            name = mpi(name)
            if name == '_at_sign':
                self.grid._remove_agent(self, self.pos)
                object.__delattr__(self, 'pos')
            else:
                object.__delattr__(self, name)

        # purge from _attr or _rel (blindly guessing until we get it)
        try:
            self._attr.remove(name)
        except KeyError:
            try:
                self._rel.remove(name)
            except KeyError:
                pass

    # rules fire through the staged scheduler, one stage per rule type;
    # the plain step function is unused
    def step(self):
        pass
"#,
        imports = imports,
        rule_file = opts.rule_file,
        class_name = class_name,
        protected_rules = protected_rules,
        rule_declarations = rule_declarations,
    );

    if flags.contains(Helper::Copy) {
        code.push_str(
            r#"
    def copy(self, is_deep=False):
        """
        Copies an agent, but explicitly *does not* add them to the
        scheduler or grid. To do so, queue it through add_vita_group.
        NOTE: deep copies are NOT RECOMMENDED.
        """
        new = copy.copy(self) if not is_deep else copy.deepcopy(self)
        new.unique_id = None
        new.model = None
        return new
"#,
        );
    }

    if flags.contains(Helper::HasAttr) {
        code.push_str(
            r#"
    def has_attr(self, qry):
        """
        Determines if this agent matches a specified query of attributes.
        qry may be a string, an iterable of names, or a name-to-value
        mapping; names are canonicalized before the check.
        """
        if isinstance(qry, dict):
            qry = {mpi(key): value for key, value in qry.items()}
            return qry.items() <= self.__dict__.items()
        elif isinstance(qry, str):  # place above iterable check, since str is iterable
            return mpi(qry) in self.__dict__.keys()
        elif isinstance(qry, Iterable):
            return all(mpi(i) in self.__dict__.keys() for i in qry)

        raise TypeError(f'qry passed to has_attr should be of type dict, str, or Iterable, but was {type(qry)} instead')
"#,
        );
    }

    if flags.contains(Helper::HasRel) {
        code.push_str(
            r#"
    def has_rel(self, qry):
        """
        Determines if this agent matches a specified query of relations.
        Currently, this is the same check as has_attr.
        """
        if isinstance(qry, dict):
            qry = {mpi(key): value for key, value in qry.items()}
            return qry.items() <= self.__dict__.items()
        elif isinstance(qry, str):  # place above iterable check, since str is iterable
            return mpi(qry) in self.__dict__.keys()
        elif isinstance(qry, Iterable):
            return all(mpi(i) in self.__dict__.keys() for i in qry)

        raise TypeError(f'qry passed to has_rel should be of type dict, str, or Iterable, but was {type(qry)} instead')
"#,
        );
    }

    // the synthesized dispatch method calls matches_qry on every rule,
    // so this helper is always emitted
    code.push_str(
        r#"
    def matches_qry(self, qry):
        """
        Determines if this agent matches the given GroupQry.
        If qry.full is True the attributes and relations must be an
        exact match (not counting unique identifiers); if False, the
        qry's entries need only be a subset of the agent's. An agent
        automatically matches a None qry.
        """
        if not qry:
            return True
        if qry.rel.get('@'):
            qry.rel['pos'] = qry.rel.pop('@')

        if qry.full:
            return qry.attr.items() == {k: getattr(self, k) for k in self._attr}.items() \
                   and qry.rel.items() == {k: getattr(self, k) for k in self._rel}.items() \
                   and all([fn(self) for fn in qry.cond])
        else:
            return qry.attr.items() <= {k: getattr(self, k) for k in self._attr}.items() \
                   and qry.rel.items() <= {k: getattr(self, k) for k in self._rel}.items() \
                   and all([fn(self) for fn in qry.cond])
"#,
    );

    code.push('\n');
    code.push_str(rules_code);
    finalize(code)
}

/// Generated model class file: site/agent generation from the JSON data
/// files, the staged per-rule scheduler, and the flag-gated model-level
/// query helpers.
pub fn model_class_source(opts: &AssemblyOptions, rule_names: &[String], flags: &UsageFlags) -> String {
    let class_name = opts.model_class();
    let agent_class = opts.agent_class();
    let stage_list = rule_names
        .iter()
        .map(|r| format!("'{r}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let group_setup_call = match &opts.group_setup {
        Some(_) => format!(
            "\n        for a in self.schedule.agents:\n            {class_name}._group_setup(self, a)\n"
        ),
        None => String::new(),
    };

    let mut code = format!(
        r#""""
A custom Model class for an agent-based simulation.
"""

from .{agent_class} import {agent_class}, GroupQry
import json
import os
import warnings
from mesa import Agent, Model
from mesa.space import NetworkGrid
from mesa.time import StagedActivation
from .make_python_identifier import make_python_identifier as mpi
import networkx as nx


class {class_name}(Model):

    def __init__(self, datacollector=None):
        super().__init__()
        # work from the directory this file is in
        os.chdir(os.path.dirname(os.path.realpath(__file__)))
        self.schedule = StagedActivation(self, stage_list=[{stage_list}])
        self.G = nx.Graph()
        self.time = 0  # simple iteration counter
        self._generate_sites()
        self.grid = NetworkGrid(self.G)
        # a dictionary of {{hash: site}} values for easy relation lookups
        # during agent generation
        self.site_hashes = {{h: s for s, h in dict(self.G.nodes.data('hash')).items()}}
        self._generate_agents()
        self.vita_groups = []
        self.datacollector = datacollector
{group_setup_call}
    def step(self):
        if self.datacollector:
            self.datacollector.collect(self)
        else:
            warnings.warn('This Model has no DataCollector! You may want to add one in the '
                          '`datacollector` attribute before running the model')

        self.schedule.step()

        while self.vita_groups:
            a = self.vita_groups.pop()
            a.unique_id = self.next_id()
            a.model = self
            self.schedule.add(a)

        for a in self.schedule.agents:
            if getattr(a, '__void__', False):
                self.grid._remove_agent(a, a.pos)
                self.schedule.remove(a)

        self.time += 1

    # ------------------------- INITIALIZATION HELPERS -------------------------

    def _generate_agents(self):
        """
        Called once during __init__ to create agents from the original
        simulation's groups and add them to the grid and scheduler.
        """
        with open("{group_file}", 'r') as file:
            j = json.load(file)
            for group in j:
                for _ in range(group['m']):
                    a = {agent_class}(self.next_id(), self, group['attr'], group['rel'])
                    self.schedule.add(a)

    def _generate_sites(self):
        """
        Called once during __init__ to load the original simulation's
        sites into the networkx graph.
        """
        with open("{site_file}", 'r') as file:
            j = json.load(file)
            for site in j:
                self.G.add_node(str(site['name']), hash=site['hash'], rel_name=site['rel_name'])
                for k, v in site['attr'].items():
                    self.G.nodes[str(site['name'])][k] = v
"#,
        agent_class = agent_class,
        class_name = class_name,
        stage_list = stage_list,
        group_setup_call = group_setup_call,
        group_file = opts.group_file,
        site_file = opts.site_file,
    );

    if let Some(setup) = &opts.group_setup {
        code.push('\n');
        for line in setup.lines() {
            if line.is_empty() {
                code.push('\n');
            } else {
                code.push_str(&format!("    {line}\n"));
            }
        }
    }

    code.push_str("\n    # ------------------------- RUNTIME FUNCTIONS -------------------------\n");

    if flags.contains(Helper::GetAttr) {
        code.push_str(
            r#"
    def get_attr(self, agent_or_node, name=None):
        """
        Retrieves an attribute of an agent or a grid node.
        A string names a node in the grid; its named attribute (or its
        whole attribute dictionary when name is None) is returned. An
        Agent returns its named attribute directly.
        """
        name = mpi(name) if name is not None else name
        if isinstance(agent_or_node, str):
            node_dict = self.grid.G.nodes[agent_or_node]
            return node_dict.get(name) if name is not None else node_dict
        elif isinstance(agent_or_node, Agent):
            return getattr(agent_or_node, name)
        else:
            raise TypeError(f"get_attr expected a str or Agent for agent_or_node, but received {type(agent_or_node)}")
"#,
        );
    }

    if flags.contains(Helper::GetGroups) {
        code.push_str(
            r#"
    def get_groups(self, node_or_model, qry=None):
        """
        Returns a list of agents at the node (or in the entire model)
        that satisfy the qry.
        """
        if isinstance(node_or_model, Model):
            agents = node_or_model.schedule.agents
        elif isinstance(node_or_model, str):
            agents = self.grid.get_cell_list_contents([node_or_model])
        else:
            raise TypeError(f"get_groups expects a str or Model for node_or_model, but received {type(node_or_model)}")

        return [a for a in agents if a.matches_qry(qry)]
"#,
        );
    }

    if flags.contains(Helper::GetMass) {
        code.push_str(
            r#"
    def get_mass(self, agent_node_model, qry=None):
        """
        For an agent: the number of agents sharing all its attributes
        (ignoring unique identifiers), itself included. For a grid node
        name: the number of agents there matching the qry. For a Model:
        the total number of agents.
        """
        if isinstance(agent_node_model, str):
            return len(self.get_groups(agent_node_model, qry))
        elif isinstance(agent_node_model, Agent):
            mod_dict = {k: v for k, v in agent_node_model.__dict__.items()
                        if k not in ('unique_id', 'source_name')}  # toss unique identifiers
            return sum([mod_dict == {k: v for k, v in a.__dict__.items() if k not in ('unique_id', 'source_name')}
                        for a in self.schedule.agents])
        elif isinstance(agent_node_model, Model):
            return len(agent_node_model.schedule.agents)
        else:
            raise TypeError(f"get_mass expects a str, Agent, or Model for agent_node_model, but received "
                            f"{type(agent_node_model)}")
"#,
        );
    }

    if flags.contains(Helper::GetMassProp) {
        code.push_str(
            r#"
    def get_mass_prop(self, node, qry=None):
        """
        The fraction of agents at the given node satisfying the qry, or
        0 for an empty node.
        """
        m = self.get_mass(node)
        return self.get_mass(node, qry) / m if m > 0 else 0
"#,
        );
    }

    if flags.contains(Helper::GetMassAndProp) {
        code.push_str(
            r#"
    def get_mass_and_prop(self, node, qry=None):
        """
        A tuple of the number and the fraction of agents at the given
        node satisfying the qry.
        """
        return (self.get_mass(node, qry), self.get_mass_prop(node, qry))
"#,
        );
    }

    if flags.contains(Helper::GetGroupsMass) {
        code.push_str(
            r#"
    def get_groups_mass(self, qry=None):
        """
        The number of agents in the model satisfying the qry, or all
        agents if qry is None.
        """
        return len(self.get_groups(self, qry))
"#,
        );
    }

    if flags.contains(Helper::GetGroupsMassProp) {
        code.push_str(
            r#"
    def get_groups_mass_prop(self, qry=None):
        """
        The fraction of agents in the model satisfying the qry, or 0 for
        an empty model.
        """
        m = len(self.schedule.agents)
        return self.get_groups_mass(qry) / m if m > 0 else 0
"#,
        );
    }

    if flags.contains(Helper::GetGroupsMassAndProp) {
        code.push_str(
            r#"
    def get_groups_mass_and_prop(self, qry=None):
        """
        A tuple of the number and the fraction of agents in the model
        satisfying the qry.
        """
        return (self.get_groups_mass(qry), self.get_groups_mass_prop(qry))
"#,
        );
    }

    finalize(code)
}

/// The identifier-canonicalization helper shipped beside the generated
/// files; same semantics as the translator's own resolver.
pub fn support_module_source() -> &'static str {
    r#""""
Canonical identifier helper for generated simulation files.
"""

import keyword
import re


def make_python_identifier(string):
    """
    Deterministically maps an arbitrary string to a valid identifier.
    The relocation sentinel '@' maps to the reserved name '_at_sign'.
    """
    if string == '@':
        return '_at_sign'

    s = string.strip().lower()
    s = re.sub(r'[\s\-]', '_', s)
    s = re.sub(r'[^0-9a-z_]', '', s)
    if not s or s[0].isdigit():
        s = '_' + s
    if keyword.iskeyword(s):
        s += '_'
    return s
"#
}
