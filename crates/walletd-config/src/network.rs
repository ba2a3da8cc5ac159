use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Whether the daemon connects to the network at start-up.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum NetworkMode {
    /// Start the network collaborator and register wallets with it.
    #[default]
    Online,
    /// Run without a network; operations that need one are refused.
    Offline,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("online", NetworkMode::Online)]
    #[case("Offline", NetworkMode::Offline)]
    fn parses_mode_names(#[case] input: &str, #[case] expected: NetworkMode) {
        assert_eq!(input.parse::<NetworkMode>().expect("mode parses"), expected);
    }

    #[test]
    fn renders_the_name_the_loader_accepts() {
        assert_eq!(NetworkMode::Offline.to_string(), "offline");
    }
}
