// Described parameters -> clap arguments, and back to a request body

use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Map, Value};
use strawberry_core::{CommandDescription, ParamAction, ParameterDescription};

pub fn build_command(commands: &[CommandDescription]) -> Command {
    commands.iter().fold(
        Command::new("strawberry")
            .subcommand_required(true)
            .arg_required_else_help(true),
        |root, command| root.subcommand(subcommand(command)),
    )
}

fn subcommand(command: &CommandDescription) -> Command {
    command
        .parameters
        .iter()
        .fold(
            Command::new(command.name.clone()).about(command.description.clone()),
            |cmd, param| cmd.arg(argument(param)),
        )
}

fn argument(param: &ParameterDescription) -> Arg {
    let mut arg = Arg::new(param.name.clone())
        .long(param.name.clone())
        .help(param.description.clone());

    for alias in &param.aliases {
        let mut chars = alias.chars();
        arg = match (chars.next(), chars.next()) {
            (Some(short), None) => arg.short(short),
            _ => arg.visible_alias(alias.clone()),
        };
    }

    if let Some(var) = &param.env_variable {
        arg = arg.env(var.clone());
    }

    if param.action == ParamAction::StoreTrue {
        return arg.action(ArgAction::SetTrue);
    }

    let arg = arg.required(param.required);
    match &param.element_name {
        Some(element) => arg
            .action(ArgAction::Append)
            .value_name(element.to_uppercase()),
        None => arg.action(ArgAction::Set),
    }
}

/// Request parameters from parsed arguments. Flags are only sent when set:
/// the server reads a present flag as `true` whatever its value.
pub fn collect_params(command: &CommandDescription, matches: &ArgMatches) -> Value {
    let mut params = Map::new();
    for param in &command.parameters {
        let name = param.name.as_str();
        if param.action == ParamAction::StoreTrue {
            if matches.get_flag(name) {
                params.insert(name.to_string(), Value::Bool(true));
            }
            continue;
        }
        if param.element_name.is_some() {
            if let Some(values) = matches.get_many::<String>(name) {
                params.insert(
                    name.to_string(),
                    Value::Array(values.cloned().map(Value::String).collect()),
                );
            }
        } else if let Some(value) = matches.get_one::<String>(name) {
            params.insert(name.to_string(), Value::String(value.clone()));
        }
    }
    Value::Object(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn description() -> Vec<CommandDescription> {
        serde_json::from_value(json!([
            {
                "name": "start",
                "parameters": [
                    {"name": "alias", "aliases": ["a"], "type": "string", "required": true},
                    {"name": "untracked", "type": "boolean", "action": "store_true"}
                ]
            },
            {
                "name": "list",
                "parameters": [
                    {"name": "attributes", "type": "any", "element_name": "attribute", "element_type": "string"}
                ]
            },
            {
                "name": "get_speclet",
                "parameters": [
                    {"name": "alias", "aliases": ["a"], "type": "string", "required": true, "env_variable": "STRAWBERRY_TEST_CLI_ALIAS"}
                ]
            }
        ]))
        .unwrap()
    }

    fn parse(args: &[&str]) -> Value {
        let commands = description();
        let matches = build_command(&commands)
            .try_get_matches_from(std::iter::once("strawberry").chain(args.iter().copied()))
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        let command = commands.iter().find(|c| c.name == name).unwrap();
        collect_params(command, sub)
    }

    #[test]
    fn test_short_alias_and_flag() {
        assert_eq!(
            parse(&["start", "-a", "foo", "--untracked"]),
            json!({"alias": "foo", "untracked": true})
        );
        assert_eq!(parse(&["start", "--alias", "foo"]), json!({"alias": "foo"}));
    }

    #[test]
    fn test_repeated_sequence() {
        assert_eq!(
            parse(&["list", "--attributes", "owner", "--attributes", "state"]),
            json!({"attributes": ["owner", "state"]})
        );
        assert_eq!(parse(&["list"]), json!({}));
    }

    #[test]
    fn test_missing_required() {
        let commands = description();
        assert!(build_command(&commands)
            .try_get_matches_from(["strawberry", "start"])
            .is_err());
    }

    #[test]
    fn test_env_binding() {
        std::env::set_var("STRAWBERRY_TEST_CLI_ALIAS", "from-env");
        assert_eq!(parse(&["get_speclet"]), json!({"alias": "from-env"}));
        assert_eq!(parse(&["get_speclet", "-a", "explicit"]), json!({"alias": "explicit"}));
        std::env::remove_var("STRAWBERRY_TEST_CLI_ALIAS");
    }
}
