use std::fmt;


/// A statically-allocated CGI/1.1 variable name.
///
/// Every variable the gateway sets on its own is a variant, together with
/// the `HTTP_*` names of request headers browsers commonly send. They are
/// exposed as constants on the [`cgi`](crate::cgi) module and convert into
/// [`VarName`](super::VarName) and [`OwnedVarName`](super::OwnedVarName)
/// without allocating.
#[allow(missing_docs, non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr, strum::EnumString)]
#[strum(use_phf, serialize_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum StaticVarName {
    // RFC 3875, Section 4.1
    AUTH_TYPE,
    CONTENT_LENGTH,
    CONTENT_TYPE,
    GATEWAY_INTERFACE,
    PATH_INFO,
    PATH_TRANSLATED,
    QUERY_STRING,
    REMOTE_ADDR,
    REMOTE_HOST,
    REMOTE_USER,
    REQUEST_METHOD,
    SCRIPT_NAME,
    SERVER_NAME,
    SERVER_PORT,
    SERVER_PROTOCOL,
    SERVER_SOFTWARE,

    // Web server conventions expected by PHP and friends
    DOCUMENT_ROOT,
    HTTPS,
    PHP_SELF,
    REDIRECT_STATUS,
    REMOTE_PORT,
    REQUEST_SCHEME,
    REQUEST_URI,
    SCRIPT_FILENAME,
    SERVER_ADDR,

    // Common request headers
    HTTP_ACCEPT,
    HTTP_ACCEPT_CHARSET,
    HTTP_ACCEPT_ENCODING,
    HTTP_ACCEPT_LANGUAGE,
    HTTP_AUTHORIZATION,
    HTTP_CACHE_CONTROL,
    HTTP_CONNECTION,
    HTTP_COOKIE,
    HTTP_DNT,
    HTTP_FORWARDED,
    HTTP_HOST,
    HTTP_IF_MATCH,
    HTTP_IF_MODIFIED_SINCE,
    HTTP_IF_NONE_MATCH,
    HTTP_ORIGIN,
    HTTP_PRAGMA,
    HTTP_RANGE,
    HTTP_REFERER,
    HTTP_SEC_FETCH_DEST,
    HTTP_SEC_FETCH_MODE,
    HTTP_SEC_FETCH_SITE,
    HTTP_UPGRADE_INSECURE_REQUESTS,
    HTTP_USER_AGENT,
    HTTP_X_FORWARDED_FOR,
    HTTP_X_FORWARDED_HOST,
    HTTP_X_FORWARDED_PROTO,
    HTTP_X_REQUESTED_WITH,
    HTTP_X_REQUEST_ID,
}

impl AsRef<str> for StaticVarName {
    #[inline]
    fn as_ref(&self) -> &str {
        self.into()
    }
}

impl fmt::Debug for StaticVarName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self.as_ref(), f)
    }
}

impl fmt::Display for StaticVarName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self.as_ref(), f)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for name in ["PHP_SELF", "SCRIPT_FILENAME", "HTTP_X_FORWARDED_PROTO", "HTTPS"] {
            let var: StaticVarName = name.parse().expect("interned name");
            assert_eq!(var.as_ref(), name);
        }
        assert!("HTTP_X_UNKNOWN".parse::<StaticVarName>().is_err());
        assert!("php_self".parse::<StaticVarName>().is_err());
    }
}
