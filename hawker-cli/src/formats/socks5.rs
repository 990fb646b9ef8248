use hawker_core::models::listings::ConnectionDescriptor;

use super::ListingFileParser;

/// One `host:port:user:pass` entry per line.
pub struct Socks5Parser;

impl ListingFileParser for Socks5Parser {
    fn parse_file(&self, content: &str) -> Vec<ConnectionDescriptor> {
        content
            .trim()
            .lines()
            .map(|line| {
                let split: Vec<&str> = line.split(':').collect();
                let host = split[0];
                let port = split[1];
                let user = split[2];
                let pwd = split[3];

                ConnectionDescriptor::Socks5 {
                    host: host.into(),
                    port: port.parse().unwrap(),
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
    fn test_socks5_parser() {
        let input = "1.1.1.1:1080:user:pass
1.1.1.2:1081:user1:pass1
";
        let parser = Socks5Parser {};
        let r = parser.parse_file(input);
        let exp = vec![
            ConnectionDescriptor::Socks5 {
                host: "1.1.1.1".into(),
                port: 1080,
                username: "user".into(),
                password: "pass".into(),
            },
            ConnectionDescriptor::Socks5 {
                host: "1.1.1.2".into(),
                port: 1081,
                username: "user1".into(),
                password: "pass1".into(),
            },
        ];
        assert_eq!(r, exp);
    }
}
