use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::cgi::{self, Params};
use crate::config::GatewayConfig;


/// Requests refused before any filesystem or network access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SecurityError {
    /// The request path resolves to a location outside the document root.
    #[error("request path escapes the document root")]
    PathTraversal,
    /// The request path is not valid UTF-8 or contains a NUL byte after
    /// percent-decoding.
    #[error("request path is malformed")]
    MalformedPath,
}


/// A request mapped onto a script of the FastCGI application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTarget {
    script_name: String,
    path_info: String,
    script_filename: PathBuf,
    path_translated: Option<PathBuf>,
    secure: bool,
}

impl ScriptTarget {
    /// The URL path identifying the script, without the mount prefix.
    #[inline]
    #[must_use]
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// The URL path following the script name. May be empty.
    #[inline]
    #[must_use]
    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    /// The absolute path of the script inside the document root.
    #[inline]
    #[must_use]
    pub fn script_filename(&self) -> &Path {
        &self.script_filename
    }

    /// Returns `https` for requests received over TLS, `http` otherwise.
    #[inline]
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }

    /// Writes the mapping into `params`, replacing the defaults derived from
    /// the HTTP request.
    ///
    /// Sets `SCRIPT_NAME`, `PHP_SELF`, `PATH_INFO`, `SCRIPT_FILENAME` and
    /// `REQUEST_SCHEME`. `PATH_TRANSLATED` is set if there is a path info
    /// that maps into the document root, and `HTTPS=on` for TLS requests.
    pub fn apply(&self, params: &mut Params) {
        params.insert(cgi::SCRIPT_NAME, &self.script_name);
        params.insert(cgi::PHP_SELF, &self.script_name);
        params.insert(cgi::PATH_INFO, &self.path_info);
        params.insert(cgi::SCRIPT_FILENAME, path_bytes(&self.script_filename));
        params.insert(cgi::REQUEST_SCHEME, self.scheme());

        match &self.path_translated {
            Some(p) => params.insert(cgi::PATH_TRANSLATED, path_bytes(p)),
            None => params.remove(cgi::PATH_TRANSLATED),
        };
        if self.secure {
            params.insert(cgi::HTTPS, "on");
        } else {
            params.remove(cgi::HTTPS);
        }
    }
}


/// The outcome of mapping a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The request is forwarded to the FastCGI application.
    Script(ScriptTarget),
    /// The request is served from this file or directory.
    Static(PathBuf),
}

impl Target {
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Static(_))
    }
}


/// Maps the (percent-encoded) URL path of a request onto the document root.
///
/// The decoded path must stay inside the document root once `.` and `..`
/// segments are applied. Afterwards the first occurrence of the URL prefix
/// is cut out of the path, wherever it occurs, and the rest is classified:
///
/// * A path containing the script extension names a script. Everything up
///   to the first extension is `SCRIPT_NAME`, the remainder is `PATH_INFO`,
///   so `/config.php.bak` runs `/config.php`. An extension directly after a
///   `/` does not count.
/// * Otherwise, a path ending in `/` runs the directory's index script.
/// * Anything else is a static file.
///
/// Every filesystem path derived along the way is checked against the
/// document root again.
///
/// # Errors
/// Returns a [`SecurityError`] if the path is malformed or escapes the
/// document root.
pub fn resolve(path: &str, secure: bool, config: &GatewayConfig) -> Result<Target, SecurityError> {
    let root = config.document_root();
    let decoded = percent_decode_str(path).decode_utf8()
        .map_err(|_| SecurityError::MalformedPath)?;
    if decoded.contains('\0') {
        return Err(SecurityError::MalformedPath);
    }
    join_contained(root, &decoded)?;

    let rel = match config.url_prefix() {
        "" => decoded,
        prefix => Cow::Owned(decoded.replacen(prefix, "", 1)),
    };

    let (script_name, path_info) = match split_script(&rel, config.script_extension()) {
        Some(end) => (rel[..end].to_owned(), &rel[end..]),
        None if rel.ends_with('/') => {
            let dir = rel.trim_end_matches('/');
            (format!("{dir}/{}", config.index_file()), "")
        },
        None => return join_contained(root, &rel).map(Target::Static),
    };

    let script_filename = join_contained(root, &script_name)?;
    let path_translated = match path_info {
        "" => None,
        info => join_contained(root, info).ok(),
    };
    Ok(Target::Script(ScriptTarget {
        script_name,
        path_info: path_info.to_owned(),
        script_filename,
        path_translated,
        secure,
    }))
}

/// Returns the end of the script name in `path`, if there is one.
///
/// This is the end of the first occurrence of `ext` that follows some other
/// character than `/`. Whatever comes after it, even within the same
/// segment, is path info.
fn split_script(path: &str, ext: &str) -> Option<usize> {
    path.match_indices(ext)
        .find(|&(start, _)| path[..start].ends_with(|c: char| c != '/'))
        .map(|(start, _)| start + ext.len())
}

/// Joins the `/`-separated `rel` onto `root` and normalizes the result.
///
/// `root` must already be normalized. A leading `/` in `rel` never replaces
/// the root.
fn join_contained(root: &Path, rel: &str) -> Result<PathBuf, SecurityError> {
    let mut joined = root.to_path_buf();
    joined.extend(rel.split('/').filter(|s| !s.is_empty()));
    let joined = normalize(&joined);
    if joined.starts_with(root) {
        Ok(joined)
    } else {
        Err(SecurityError::PathTraversal)
    }
}

/// Normalizes a path without touching the filesystem.
///
/// `.` components and redundant separators are dropped and `..` removes the
/// preceding component. `..` directly below the root stays at the root.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {},
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push(Component::ParentDir);
                }
            },
            c => out.push(c),
        }
    }
    out
}

/// Returns the raw bytes of a path for use as a CGI variable value.
pub(crate) fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Cow::Borrowed(path.as_os_str().as_bytes())
    }
    #[cfg(not(unix))]
    match path.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;

    const ROOT: &str = "/srv/www";

    fn config(prefix: &str) -> GatewayConfig {
        GatewayConfig::new(Endpoint::Tcp("127.0.0.1:9000".into()), ROOT, prefix)
            .expect("valid config")
    }

    fn script(path: &str, config: &GatewayConfig) -> ScriptTarget {
        match resolve(path, false, config) {
            Ok(Target::Script(s)) => s,
            other => panic!("{path:?} did not resolve to a script: {other:?}"),
        }
    }

    #[test]
    fn normalize_paths() {
        let cases = [
            ("/srv/www/./a//b/", "/srv/www/a/b"),
            ("/srv/www/a/../b", "/srv/www/b"),
            ("/../..", "/"),
            ("/srv/www/../../../etc", "/etc"),
            ("a/../../b", "../b"),
            ("", ""),
        ];
        for (input, want) in cases {
            assert_eq!(normalize(Path::new(input)), Path::new(want), "normalize({input:?})");
        }
    }

    #[test]
    fn split_points() {
        assert_eq!(split_script("/app/index.php/extra/path", ".php"), Some(14));
        assert_eq!(split_script("/app/index.php", ".php"), Some(14));
        assert_eq!(split_script("/app/.php/extra", ".php"), None);
        assert_eq!(split_script("/app/x.phps", ".php"), Some(10));
        assert_eq!(split_script("/a.phps/b.php/c", ".php"), Some(6));
        assert_eq!(split_script("/.php/a.php", ".php"), Some(11));
        assert_eq!(split_script(".php", ".php"), None);
        assert_eq!(split_script("x.php", ".php"), Some(5));
    }

    #[test]
    fn script_with_path_info() {
        let config = config("");
        let s = script("/app/index.php/extra/path", &config);
        assert_eq!(s.script_name(), "/app/index.php");
        assert_eq!(s.path_info(), "/extra/path");
        assert_eq!(s.script_filename(), Path::new("/srv/www/app/index.php"));
        assert_eq!(s.path_translated.as_deref(), Some(Path::new("/srv/www/extra/path")));

        let s = script("/app/index.php", &config);
        assert_eq!(s.script_name(), "/app/index.php");
        assert_eq!(s.path_info(), "");
        assert_eq!(s.path_translated, None);
    }

    #[test]
    fn suffixed_scripts_are_not_static() {
        let config = config("");
        for (path, name, info) in [
            ("/config.php.bak", "/config.php", ".bak"),
            ("/index.php~", "/index.php", "~"),
            ("/x.phps", "/x.php", "s"),
            ("/a.php5/b", "/a.php", "5/b"),
        ] {
            let s = script(path, &config);
            assert_eq!((s.script_name(), s.path_info()), (name, info), "{path}");
        }
        let s = script("/config.php.bak", &config);
        assert_eq!(s.script_filename(), Path::new("/srv/www/config.php"));
    }

    #[test]
    fn extension_only_segment_is_static() {
        let target = resolve("/app/.php/extra", false, &config(""));
        assert_eq!(target, Ok(Target::Static("/srv/www/app/.php/extra".into())));
    }

    #[test]
    fn directory_index() {
        let config = config("");
        let s = script("/blog/", &config);
        assert_eq!(s.script_name(), "/blog/index.php");
        assert_eq!(s.path_info(), "");
        assert_eq!(s.script_filename(), Path::new("/srv/www/blog/index.php"));

        let s = script("/", &config);
        assert_eq!(s.script_name(), "/index.php");
        assert_eq!(s.script_filename(), Path::new("/srv/www/index.php"));

        let custom = config.with_index_file("app.php").expect("valid index");
        assert_eq!(script("/docs//", &custom).script_name(), "/docs/app.php");
    }

    #[test]
    fn static_fallback() {
        let config = config("");
        let target = resolve("/assets/logo.png", false, &config);
        assert_eq!(target, Ok(Target::Static("/srv/www/assets/logo.png".into())));
        assert!(target.is_ok_and(|t| t.is_static()));
        assert_eq!(resolve("", false, &config), Ok(Target::Static(ROOT.into())));
    }

    #[test]
    fn prefix_stripped_once() {
        let config = config("/php/");
        let s = script("/php/index.php", &config);
        assert_eq!(s.script_name(), "/index.php");
        assert_eq!(s.script_filename(), Path::new("/srv/www/index.php"));

        let s = script("/php/php/index.php", &config);
        assert_eq!(s.script_name(), "/php/index.php");

        // The prefix is cut out wherever it occurs first
        let s = script("/app/php/x.php", &config);
        assert_eq!(s.script_name(), "/app/x.php");

        assert_eq!(script("/php/", &config).script_name(), "/index.php");
        assert_eq!(resolve("/php", false, &config), Ok(Target::Static(ROOT.into())));
    }

    #[test]
    fn traversal_rejected() {
        let config = config("");
        for path in [
            "/../../etc/passwd",
            "/a/../../etc/passwd",
            "/%2e%2e/%2e%2e/etc/passwd",
            "/..%2f..%2fetc/passwd",
            "/x/../../www-evil/index.php",
            "/x/../../y.php/../r",
        ] {
            assert_eq!(resolve(path, false, &config), Err(SecurityError::PathTraversal), "{path:?}");
        }
        // Leaving and re-entering the root is fine
        let s = script("/a/../b/./c.php", &config);
        assert_eq!(s.script_filename(), Path::new("/srv/www/b/c.php"));
    }

    #[test]
    fn derived_path_rechecked() {
        let config = config("");
        // The full path returns into the root, the script part does not
        assert_eq!(resolve("/../x.php/../www/y", false, &config), Err(SecurityError::PathTraversal));

        // PATH_TRANSLATED is dropped when the path info alone escapes
        let s = script("/a/b/c.php/../../../x", &config);
        assert_eq!(s.script_filename(), Path::new("/srv/www/a/b/c.php"));
        assert_eq!(s.path_info(), "/../../../x");
        assert_eq!(s.path_translated, None);

        let config = GatewayConfig::new(Endpoint::Tcp("x:1".into()), ROOT, "/www")
            .expect("valid config");
        assert_eq!(resolve("/a/../../www/b.php", false, &config), Err(SecurityError::PathTraversal));
    }

    #[test]
    fn malformed_paths() {
        let config = config("");
        assert_eq!(resolve("/a%00.php", false, &config), Err(SecurityError::MalformedPath));
        assert_eq!(resolve("/%ff%fe", false, &config), Err(SecurityError::MalformedPath));
        assert!(matches!(resolve("/caf%C3%A9.php", false, &config), Ok(Target::Script(s)) if s.script_name() == "/café.php"));
    }

    #[test]
    fn containment_property() {
        const SEGMENTS: [&str; 8] = ["..", ".", "", "a", "b.php", "php", "%2e%2e", "c"];
        let config = config("/php");
        let root = Path::new(ROOT);
        for _ in 0..2000 {
            let len = fastrand::usize(1..8);
            let path: String = std::iter::repeat_with(|| SEGMENTS[fastrand::usize(..SEGMENTS.len())])
                .take(len)
                .fold(String::new(), |acc, s| acc + "/" + s);

            match resolve(&path, fastrand::bool(), &config) {
                Ok(Target::Static(p)) => assert!(p.starts_with(root), "{path:?} -> {p:?}"),
                Ok(Target::Script(s)) => {
                    assert!(s.script_filename().starts_with(root), "{path:?} -> {s:?}");
                    assert!(s.script_name().ends_with(".php"));
                    if let Some(p) = &s.path_translated {
                        assert!(p.starts_with(root));
                    }
                },
                Err(e) => assert_eq!(e, SecurityError::PathTraversal, "{path:?}"),
            }
        }
    }

    #[test]
    fn params_override() {
        let config = config("");
        let mut params = Params::new();
        params.insert(cgi::SCRIPT_NAME, "/php/index.php/x");
        params.insert(cgi::PATH_TRANSLATED, "stale");
        params.insert(cgi::REQUEST_METHOD, "GET");

        let s = script("/index.php", &config);
        s.apply(&mut params);
        assert_eq!(params.get_str(cgi::SCRIPT_NAME), Some("/index.php"));
        assert_eq!(params.get_str(cgi::PHP_SELF), Some("/index.php"));
        assert_eq!(params.get_str(cgi::PATH_INFO), Some(""));
        assert_eq!(params.get_str(cgi::SCRIPT_FILENAME), Some("/srv/www/index.php"));
        assert_eq!(params.get_str(cgi::REQUEST_SCHEME), Some("http"));
        assert_eq!(params.get_str(cgi::REQUEST_METHOD), Some("GET"));
        assert!(!params.contains(cgi::PATH_TRANSLATED));
        assert!(!params.contains(cgi::HTTPS));
    }

    #[test]
    fn scheme_propagation() {
        let config = config("");
        for (secure, scheme) in [(true, "https"), (false, "http")] {
            let Ok(Target::Script(s)) = resolve("/a.php/b", secure, &config) else {
                panic!("expected a script target");
            };
            let mut params = Params::new();
            s.apply(&mut params);
            assert_eq!(params.get_str(cgi::REQUEST_SCHEME), Some(scheme));
            assert_eq!(params.get_str(cgi::HTTPS), secure.then_some("on"));
            assert_eq!(params.get_str(cgi::PATH_TRANSLATED), Some("/srv/www/b"));
        }
    }
}
