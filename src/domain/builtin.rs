use crate::domain::{Catalog, Command, CommandOption, Subcommand};

fn subs(entries: &[(&str, &str)]) -> Vec<Subcommand> {
    entries
        .iter()
        .map(|(name, description)| Subcommand::new(name, description))
        .collect()
}

/// The catalog used when no catalog file is configured.
pub fn builtin_catalog() -> Catalog {
    Catalog::new(vec![
        Command::new("ask", "Ask any NixOS question")
            .needs_input()
            .with_options(vec![
                CommandOption::text("Provider", "provider", "AI provider (ollama, openai, gemini)")
                    .with_default("ollama"),
                CommandOption::text("Model", "model", "AI model (llama3, gpt-4, gemini-2.5-pro)"),
                CommandOption::text("Role", "role", "Agent role (diagnoser, explainer, etc.)"),
                CommandOption::switch(
                    "Quiet Mode",
                    "quiet",
                    "Suppress validation output, show only AI response",
                ),
            ]),
        Command::new("search", "Search for NixOS packages/services")
            .needs_input()
            .with_options(vec![
                CommandOption::text("Package", "package", "Package name to search").required(),
                CommandOption::text("Channel", "channel", "NixOS channel (stable, unstable)")
                    .with_default("unstable"),
            ]),
        Command::new("explain-option", "Explain a NixOS option")
            .needs_input()
            .with_options(vec![
                CommandOption::text("Option", "option", "NixOS option to explain").required(),
                CommandOption::text("Format", "format", "Output format (markdown, plain, table)")
                    .with_default("markdown"),
                CommandOption::switch("Examples Only", "examples-only", "Show only usage examples"),
            ]),
        Command::new("community", "Community resources and support").with_subcommands(subs(&[
            ("search", "Search community configurations"),
            ("share", "Share your configuration"),
            ("validate", "Validate your configuration"),
            ("trends", "Show community trends"),
            ("rate", "Rate configurations"),
        ])),
        Command::new("devenv", "Create and manage development environments").with_subcommands(
            subs(&[
                ("list", "List available templates"),
                ("create", "Create new development environment"),
                ("suggest", "Get AI template suggestions"),
            ]),
        ),
        Command::new("mcp-server", "Start or manage the MCP server").with_subcommands(subs(&[
            ("start", "Start the MCP server"),
            ("stop", "Stop the MCP server"),
            ("status", "Check server status"),
            ("restart", "Restart the server"),
            ("query", "Query documentation"),
        ])),
        Command::new("machines", "Manage configurations across multiple machines")
            .with_subcommands(subs(&[
                ("list", "List configured machines"),
                ("deploy", "Deploy configurations"),
                ("setup-deploy-rs", "Setup deploy-rs"),
            ])),
        Command::new(
            "doctor",
            "Run comprehensive NixOS health checks and get AI-powered diagnostics",
        )
        .with_options(vec![CommandOption::switch(
            "Verbose",
            "verbose",
            "Show detailed output and progress information",
        )])
        .with_subcommands(subs(&[
            ("system", "Core system health checks"),
            ("nixos", "NixOS-specific configuration checks"),
            ("packages", "Package and store integrity checks"),
            ("services", "System service status checks"),
            ("storage", "Storage and filesystem checks"),
            ("network", "Network connectivity checks"),
            ("security", "Security configuration checks"),
            ("all", "Run all available checks (default)"),
        ])),
        Command::new("flake", "Nix flake utilities").with_subcommands(vec![
            Subcommand::new("init", "Initialize new flake"),
            Subcommand::new("check", "Check flake validity"),
            Subcommand::new("validate", "Validate flake with live output").with_options(vec![
                CommandOption::text("Flake Path", "path", "Path to flake.nix (default: auto-detect)"),
            ]),
            Subcommand::new("show", "Show flake outputs"),
            Subcommand::new("update", "Update flake inputs"),
            Subcommand::new("template", "Create from template"),
            Subcommand::new("convert", "Convert to flake"),
        ]),
        Command::new("learn", "NixOS learning and training commands").with_subcommands(subs(&[
            ("basics", "Learn NixOS basics"),
            ("flakes", "Learn about flakes"),
            ("packages", "Learn package management"),
            ("services", "Learn service configuration"),
            ("advanced", "Advanced topics"),
            ("troubleshooting", "Troubleshooting guide"),
        ])),
        Command::new("logs", "Analyze and parse NixOS logs").with_subcommands(subs(&[
            ("system", "System logs"),
            ("boot", "Boot logs"),
            ("service", "Service logs"),
            ("errors", "Error logs"),
            ("build", "Build logs"),
            ("analyze", "Analyze logs with AI"),
        ])),
        Command::new("templates", "Manage NixOS configuration templates").with_subcommands(subs(
            &[
                ("list", "List templates"),
                ("show", "Show template"),
                ("apply", "Apply template"),
                ("search", "Search templates"),
                ("save", "Save template"),
                ("categories", "List categories"),
            ],
        )),
        Command::new("snippets", "Manage NixOS configuration snippets").with_subcommands(subs(&[
            ("list", "List snippets"),
            ("add", "Add snippet"),
            ("show", "Show snippet"),
            ("remove", "Remove snippet"),
            ("search", "Search snippets"),
        ])),
        Command::new("store", "Manage, backup, and analyze the Nix store").with_subcommands(subs(
            &[
                ("backup", "Backup store"),
                ("restore", "Restore store"),
                ("integrity", "Check integrity"),
                ("performance", "Analyze performance"),
            ],
        )),
        Command::new("deps", "Analyze NixOS configuration dependencies").with_subcommands(subs(
            &[
                ("analyze", "Analyze dependencies"),
                ("why", "Explain package inclusion"),
                ("conflicts", "Find conflicts"),
                ("optimize", "Optimize dependencies"),
                ("graph", "Generate dependency graph"),
            ],
        )),
        Command::new("build", "Enhanced build troubleshooting and optimization").with_subcommands(
            subs(&[
                ("debug", "Deep build failure analysis with pattern recognition"),
                ("retry", "Intelligent retry with automated fixes"),
                ("cache-miss", "Analyze cache miss reasons and optimization"),
                ("sandbox-debug", "Debug sandbox-related build issues"),
                ("profile", "Build performance analysis and optimization"),
                ("watch", "Real-time build monitoring with AI insights"),
                ("status", "Check status of background builds"),
                ("stop", "Cancel a running background build"),
                ("background", "Start a build in the background"),
                ("queue", "Build multiple packages sequentially"),
            ]),
        ),
        Command::new("package-repo", "Analyze Git repos and generate Nix derivations")
            .needs_input()
            .with_options(vec![
                CommandOption::text("Repository URL", "repo-url", "Git repository URL to analyze"),
                CommandOption::text("Local Path", "local", "Local repository path"),
                CommandOption::text("Output Path", "output", "Output file path for derivation"),
                CommandOption::text("Package Name", "name", "Custom package name"),
                CommandOption::switch(
                    "Analyze Only",
                    "analyze-only",
                    "Only analyze, don't generate derivation",
                ),
            ]),
        Command::new("diagnose", "Diagnose NixOS issues")
            .needs_input()
            .with_options(vec![
                CommandOption::text("Input File", "file", "Specify log file path to analyze"),
                CommandOption::text(
                    "Diagnostic Type",
                    "type",
                    "Type: system, config, services, network, hardware, performance",
                ),
                CommandOption::text("Output Format", "output", "Output format: markdown, plain, json"),
                CommandOption::text("Additional Context", "context", "Additional context information"),
            ]),
        Command::new("config", "Manage nixai configuration"),
        Command::new("configure", "Configure NixOS interactively")
            .needs_input()
            .with_options(vec![
                CommandOption::text(
                    "Search Query",
                    "search",
                    "Search query for configuration type (e.g., 'web server nginx')",
                ),
                CommandOption::text("Output File", "output", "Output file path for generated configuration"),
                CommandOption::switch(
                    "Advanced Mode",
                    "advanced",
                    "Generate advanced configuration with detailed options",
                ),
                CommandOption::switch(
                    "Home Manager",
                    "home",
                    "Generate Home Manager configuration instead of NixOS",
                ),
            ]),
        Command::new("gc", "AI-powered garbage collection analysis")
            .needs_input()
            .with_options(vec![
                CommandOption::switch(
                    "Dry Run",
                    "dry-run",
                    "Show what would be done without making changes",
                ),
                CommandOption::int(
                    "Keep Generations",
                    "keep-generations",
                    "Number of recent generations to keep (default: 5)",
                ),
            ])
            .with_subcommands(vec![
                Subcommand::new("analyze", "Analyze store usage and show cleanup opportunities"),
                Subcommand::new("safe-clean", "AI-guided safe cleanup with explanations").with_options(
                    vec![
                        CommandOption::switch(
                            "Dry Run",
                            "dry-run",
                            "Show what would be done without making changes",
                        ),
                        CommandOption::int(
                            "Keep Generations",
                            "keep-generations",
                            "Number of recent generations to keep",
                        )
                        .with_default("5"),
                    ],
                ),
                Subcommand::new("compare-generations", "Compare generations with recommendations"),
                Subcommand::new("disk-usage", "Visualize store usage with recommendations"),
            ]),
        Command::new("hardware", "AI-powered hardware configuration optimizer")
            .needs_input()
            .with_subcommands(vec![
                Subcommand::new("detect", "Detect and analyze system hardware"),
                Subcommand::new("optimize", "Apply hardware-specific optimizations").with_options(
                    vec![
                        CommandOption::switch(
                            "Dry Run",
                            "dry-run",
                            "Show optimization recommendations without applying changes",
                        ),
                        CommandOption::switch("Power Save", "power-save", "Optimize for maximum battery life"),
                        CommandOption::switch("Performance", "performance", "Optimize for maximum performance"),
                    ],
                ),
                Subcommand::new("drivers", "Auto-configure drivers and firmware").with_options(vec![
                    CommandOption::switch(
                        "Auto Install",
                        "auto-install",
                        "Provide installation commands for recommended drivers",
                    ),
                ]),
                Subcommand::new("compare", "Compare current vs optimal settings"),
                Subcommand::new("laptop", "Laptop-specific optimizations"),
            ]),
        Command::new("migrate", "AI-powered migration assistant")
            .needs_input()
            .with_subcommands(vec![
                Subcommand::new("analyze", "Analyze current setup and migration complexity")
                    .with_options(vec![CommandOption::switch(
                        "Verbose",
                        "verbose",
                        "Show detailed analysis",
                    )]),
                Subcommand::new("to-flakes", "Convert from channels to flakes").with_options(vec![
                    CommandOption::text("Backup Name", "backup-name", "Custom backup name"),
                    CommandOption::switch("Dry Run", "dry-run", "Show migration steps without executing"),
                ]),
            ]),
        Command::new("neovim-setup", "Neovim integration setup")
            .needs_input()
            .with_subcommands(vec![
                Subcommand::new("install", "Install Neovim integration with nixai").with_options(
                    vec![
                        CommandOption::text(
                            "Config Directory",
                            "config-dir",
                            "Neovim configuration directory (default: auto-detect)",
                        ),
                        CommandOption::text("Socket Path", "socket-path", "MCP server socket path")
                            .with_default("/tmp/nixai-mcp.sock"),
                    ],
                ),
                Subcommand::new("configure", "Configure Neovim integration settings"),
                Subcommand::new("status", "Check Neovim integration status"),
                Subcommand::new("update", "Update Neovim integration configuration"),
                Subcommand::new("remove", "Remove Neovim integration"),
            ]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn builtin_names_are_unique() {
        let catalog = builtin_catalog();
        let names = catalog
            .list()
            .iter()
            .map(|command| command.name.as_str())
            .collect::<BTreeSet<_>>();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn flake_validate_is_reachable_from_the_catalog() {
        let catalog = builtin_catalog();
        let flake = catalog
            .get(catalog.position("flake").expect("flake"))
            .expect("flake command");
        assert!(flake.subcommands.iter().any(|sub| sub.name == "validate"));
    }
}
