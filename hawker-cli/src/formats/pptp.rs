use hawker_core::models::listings::ConnectionDescriptor;

use super::ListingFileParser;

/// One `host:user:pass` entry per line. PPTP endpoints always answer on
/// the standard control port, so no port column.
pub struct PptpParser;

impl ListingFileParser for PptpParser {
    fn parse_file(&self, content: &str) -> Vec<ConnectionDescriptor> {
        content
            .trim()
            .lines()
            .map(|line| {
                let split: Vec<&str> = line.split(':').collect();
                let host = split[0];
                let user = split[1];
                let pwd = split[2];

                ConnectionDescriptor::Pptp {
                    host: host.into(),
                    username: user.into(),
                    password: pwd.into(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pptp_parser() {
        let input = "1.1.1.1:user:pass
1.1.1.2:user1:pass1
";
        let parser = PptpParser {};
        let r = parser.parse_file(input);
        let exp = vec![
            ConnectionDescriptor::Pptp {
                host: "1.1.1.1".into(),
                username: "user".into(),
                password: "pass".into(),
            },
            ConnectionDescriptor::Pptp {
                host: "1.1.1.2".into(),
                username: "user1".into(),
                password: "pass1".into(),
            },
        ];
        assert_eq!(r, exp);
    }
}
