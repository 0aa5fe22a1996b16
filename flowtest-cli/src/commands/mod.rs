//! Command handlers -- one module per subcommand
