use crate::cleaner::TestSelector;
use crate::transport::ChannelId;

use super::types::Command;

/// Parse a prefixed command. `None` for plain text and unknown commands.
pub fn parse_command(prefix: &str, input: &str) -> Option<Command> {
    if prefix.is_empty() {
        return None;
    }
    let body = input.trim().strip_prefix(prefix)?;

    let mut parts = body.splitn(2, char::is_whitespace);
    let cmd = parts.next()?.to_lowercase();
    let args = parts.next().unwrap_or("").trim();
    let first_arg = args.split_whitespace().next();

    match cmd.as_str() {
        "enablecleaner" => Some(
            parse_channel_arg(first_arg)
                .map(|channel| Command::EnableCleaner { channel })
                .unwrap_or(Command::Malformed {
                    name: "enablecleaner",
                }),
        ),
        "disablecleaner" => Some(
            parse_channel_arg(first_arg)
                .map(|channel| Command::DisableCleaner { channel })
                .unwrap_or(Command::Malformed {
                    name: "disablecleaner",
                }),
        ),
        "setcleaningtime" => Some(
            first_arg
                .and_then(|arg| arg.parse::<i64>().ok())
                .map(|hours| Command::SetCleaningTime { hours })
                .unwrap_or(Command::Malformed {
                    name: "setcleaningtime",
                }),
        ),
        "testcleaner" => Some(
            first_arg
                .and_then(TestSelector::parse)
                .map(|selector| Command::TestCleaner { selector })
                .unwrap_or(Command::Malformed {
                    name: "testcleaner",
                }),
        ),
        "cleanersetting" => Some(Command::CleanerSetting),
        "listchannels" => Some(Command::ListChannels),
        "checkpermissions" => Some(Command::CheckPermissions),
        "cleanerhelp" => Some(Command::Help),
        _ => None,
    }
}

/// `Some(None)` when absent, `None` when present but not an id.
fn parse_channel_arg(arg: Option<&str>) -> Option<Option<ChannelId>> {
    match arg {
        None => Some(None),
        Some(raw) => raw
            .trim_start_matches("<#")
            .trim_end_matches('>')
            .parse::<ChannelId>()
            .ok()
            .map(Some),
    }
}
