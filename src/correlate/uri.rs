//! Git remote-URL equivalence.
//!
//! Job configurations and inbound notifications rarely spell the same
//! repository identically: one side may include an explicit default port, a
//! trailing `.git`, or omit the scheme. Equivalence here means "a clone of
//! either URL yields the same repository", so the comparison tolerates those
//! differences rather than demanding byte equality.

/// A remote URL broken into comparable parts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RepoUri {
    /// Lowercased scheme, if the URL had one.
    scheme: Option<String>,

    /// Lowercased host.
    host: String,

    /// Explicit port, if the URL had one.
    port: Option<u16>,

    /// Path with any trailing `/` and `.git` suffix stripped, lowercased.
    path: String,
}

impl RepoUri {
    fn parse(url: &str) -> RepoUri {
        let (scheme, rest) = match url.split_once("://") {
            Some((s, rest)) => (Some(s.to_lowercase()), rest),
            None => (None, url),
        };

        let (authority, path) = match rest.split_once('/') {
            Some((a, p)) => (a, p),
            None => (rest, ""),
        };

        // Drop userinfo; it does not change which repository this is.
        let host_port = authority.rsplit('@').next().unwrap_or(authority);
        let (host, port) = match host_port.rsplit_once(':') {
            Some((h, p)) => match p.parse::<u16>() {
                Ok(port) => (h, Some(port)),
                Err(_) => (host_port, None),
            },
            None => (host_port, None),
        };

        let mut path = path.trim_end_matches('/').to_lowercase();
        if let Some(stripped) = path.strip_suffix(".git") {
            path = stripped.to_string();
        }

        RepoUri {
            scheme,
            host: host.to_lowercase(),
            port,
            path,
        }
    }

    /// The port this URL effectively uses: explicit, or the scheme default.
    fn effective_port(&self) -> Option<u16> {
        self.port.or(match self.scheme.as_deref() {
            Some("http") => Some(80),
            Some("https") => Some(443),
            Some("ssh") => Some(22),
            _ => None,
        })
    }
}

/// Whether two remote URLs name the same git repository.
///
/// Hosts compare case-insensitively; paths compare ignoring a trailing `.git`
/// or `/`. A missing scheme on either side is tolerated, as is an explicit
/// port that matches the other side's scheme default. When both sides pin
/// down a scheme or an effective port, those must agree.
pub fn same_git_repo(a: &str, b: &str) -> bool {
    let a = RepoUri::parse(a);
    let b = RepoUri::parse(b);

    if a.host != b.host || a.path != b.path {
        return false;
    }
    if let (Some(sa), Some(sb)) = (&a.scheme, &b.scheme) {
        if sa != sb {
            return false;
        }
    }
    if let (Some(pa), Some(pb)) = (a.effective_port(), b.effective_port()) {
        if pa != pb {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identical_urls_match() {
        assert!(same_git_repo(
            "https://acct.example/proj/_git/repo",
            "https://acct.example/proj/_git/repo"
        ));
    }

    #[test]
    fn host_case_is_ignored() {
        assert!(same_git_repo(
            "https://ACCT.Example/proj/_git/repo",
            "https://acct.example/proj/_git/repo"
        ));
    }

    #[test]
    fn trailing_dot_git_is_ignored() {
        assert!(same_git_repo(
            "https://acct.example/proj/_git/repo.git",
            "https://acct.example/proj/_git/repo"
        ));
    }

    #[test]
    fn trailing_slash_is_ignored() {
        assert!(same_git_repo(
            "https://acct.example/proj/_git/repo/",
            "https://acct.example/proj/_git/repo"
        ));
    }

    #[test]
    fn explicit_default_port_matches_implied() {
        assert!(same_git_repo(
            "https://acct.example:443/proj/_git/repo",
            "https://acct.example/proj/_git/repo"
        ));
        assert!(same_git_repo(
            "http://acct.example:80/proj/_git/repo",
            "http://acct.example/proj/_git/repo"
        ));
    }

    #[test]
    fn non_default_port_does_not_match() {
        assert!(!same_git_repo(
            "https://acct.example:8080/proj/_git/repo",
            "https://acct.example/proj/_git/repo"
        ));
    }

    #[test]
    fn missing_scheme_is_tolerated() {
        assert!(same_git_repo(
            "acct.example/proj/_git/repo",
            "https://acct.example/proj/_git/repo"
        ));
    }

    #[test]
    fn different_schemes_do_not_match() {
        assert!(!same_git_repo(
            "http://acct.example/proj/_git/repo",
            "https://acct.example/proj/_git/repo"
        ));
    }

    #[test]
    fn userinfo_is_ignored() {
        assert!(same_git_repo(
            "https://alice@acct.example/proj/_git/repo",
            "https://acct.example/proj/_git/repo"
        ));
    }

    #[test]
    fn different_hosts_do_not_match() {
        assert!(!same_git_repo(
            "https://one.example/proj/_git/repo",
            "https://two.example/proj/_git/repo"
        ));
    }

    #[test]
    fn different_paths_do_not_match() {
        assert!(!same_git_repo(
            "https://acct.example/proj/_git/repo",
            "https://acct.example/proj/_git/other"
        ));
    }

    proptest! {
        /// Equivalence is reflexive over plausible repository URLs.
        #[test]
        fn reflexive(
            host in "[a-z][a-z0-9.-]{0,20}",
            path in "[a-zA-Z0-9/_-]{1,30}",
        ) {
            let url = format!("https://{}/{}", host, path);
            prop_assert!(same_git_repo(&url, &url));
        }

        /// Equivalence is symmetric.
        #[test]
        fn symmetric(
            host in "[a-z][a-z0-9.-]{0,20}",
            path in "[a-zA-Z0-9/_-]{1,30}",
            git_suffix: bool,
            explicit_port: bool,
        ) {
            let a = format!("https://{}/{}", host, path);
            let mut b = a.clone();
            if git_suffix {
                b.push_str(".git");
            }
            if explicit_port {
                b = format!("https://{}:443/{}", host, path);
            }
            prop_assert_eq!(same_git_repo(&a, &b), same_git_repo(&b, &a));
        }
    }
}
