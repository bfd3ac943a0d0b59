use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    #[default]
    String,
    Int,
    Bool,
}

impl OptionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub flag: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub has_value: bool,
    #[serde(default, rename = "default")]
    pub default_value: String,
    #[serde(default, rename = "type")]
    pub kind: OptionKind,
}

impl CommandOption {
    pub fn text(name: &str, flag: &str, description: &str) -> Self {
        Self::new(name, flag, description, OptionKind::String)
    }

    pub fn int(name: &str, flag: &str, description: &str) -> Self {
        Self::new(name, flag, description, OptionKind::Int)
    }

    pub fn switch(name: &str, flag: &str, description: &str) -> Self {
        Self::new(name, flag, description, OptionKind::Bool)
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = value.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_bool(&self) -> bool {
        self.kind == OptionKind::Bool
    }

    fn new(name: &str, flag: &str, description: &str, kind: OptionKind) -> Self {
        Self {
            name: name.to_string(),
            flag: flag.to_string(),
            description: description.to_string(),
            required: false,
            has_value: kind != OptionKind::Bool,
            default_value: String::new(),
            kind,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Subcommand {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

impl Subcommand {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Vec<CommandOption>) -> Self {
        self.options = options;
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub needs_input: bool,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    #[serde(default)]
    pub subcommands: Vec<Subcommand>,
}

impl Command {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            needs_input: false,
            options: Vec::new(),
            subcommands: Vec::new(),
        }
    }

    pub fn needs_input(mut self) -> Self {
        self.needs_input = true;
        self
    }

    pub fn with_options(mut self, options: Vec<CommandOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_subcommands(mut self, subcommands: Vec<Subcommand>) -> Self {
        self.subcommands = subcommands;
        self
    }

    fn matches(&self, lowered_query: &str) -> bool {
        self.name.to_lowercase().contains(lowered_query)
            || self.description.to_lowercase().contains(lowered_query)
    }
}

/// Read-only registry of everything the dashboard can run.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    commands: Vec<Command>,
}

impl Catalog {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn list(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Command> {
        self.commands.get(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.commands.iter().position(|command| command.name == name)
    }

    /// Catalog indices of commands whose name or description contains `query`
    /// (case-insensitive), in catalog order. An empty query keeps every index.
    pub fn filter_indices(&self, query: &str) -> Vec<usize> {
        if query.is_empty() {
            return (0..self.commands.len()).collect();
        }

        let lowered = query.to_lowercase();
        self.commands
            .iter()
            .enumerate()
            .filter(|(_, command)| command.matches(&lowered))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn filter(&self, query: &str) -> Vec<&Command> {
        if query.is_empty() {
            return self.list().iter().collect();
        }
        self.filter_indices(query)
            .into_iter()
            .filter_map(|index| self.commands.get(index))
            .collect()
    }
}
