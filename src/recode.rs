use std::{borrow::Cow, sync::LazyLock};

use encoding_rs::Encoding;
use regex::{bytes, Regex};

use crate::log;

static ENC_FROM_CTYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)charset=([a-z0-9\-]+)(?:;|$)").expect("content-type charset pattern")
});

static ENC_FROM_CONTENT: LazyLock<bytes::Regex> = LazyLock::new(|| {
    bytes::Regex::new(
        r#"(?i-u)(?:charset|encoding)=(?:"([a-z0-9\-]+)"|'([a-z0-9\-]+)'|([a-z0-9\-]+))"#,
    )
    .expect("content charset pattern")
});

static ENC_MATCH_UTF8: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^utf-?8$").expect("utf-8 label pattern"));

/// Recodes `content` in place to UTF-8.
///
/// With a forced `encoding` the content is transcoded from it. Otherwise the
/// source encoding is guessed: a `charset=`/`encoding=` declaration inside
/// the content wins over the `charset=` of `content_type`; a declared
/// encoding the content is not valid in is dropped, and the content is then
/// taken as UTF-8 if valid, ISO-8859-1 if not.
///
/// `force_ignore` replaces undecodable sequences with U+FFFD instead of
/// failing. Returns whether `content` now holds UTF-8; on `false` it is left
/// untouched.
pub fn recode(
    logging: bool,
    content_type: Option<&str>,
    content: &mut Vec<u8>,
    force_ignore: bool,
    encoding: Option<&str>,
) -> bool {
    match encoding {
        Some(label) => recode_forced(logging, label, content, force_ignore),
        None => recode_guessed(logging, content_type, content, force_ignore),
    }
}

fn recode_forced(logging: bool, label: &str, content: &mut Vec<u8>, force_ignore: bool) -> bool {
    let Some(encoding) = encoding_for(label.trim()) else {
        log::warn(
            logging,
            &format!("failed to recode page from forced encoding '{label}': unknown encoding"),
        );
        return false;
    };

    match transcode(encoding, content, force_ignore) {
        Some(text) => {
            *content = text.into_bytes();
            true
        }
        None => {
            log::warn(
                logging,
                &format!(
                    "failed to recode page from forced encoding '{label}' into UTF-8: malformed input"
                ),
            );
            false
        }
    }
}

fn recode_guessed(
    logging: bool,
    content_type: Option<&str>,
    content: &mut Vec<u8>,
    force_ignore: bool,
) -> bool {
    // Every byte sequence is valid ISO-8859-1, so the declaration scan always runs.
    let declared = declared_in_content(content).or_else(|| content_type.and_then(declared_in_ctype));

    if let Some(label) = declared.map(normalize_label) {
        match encoding_for(&label) {
            Some(encoding) => match transcode(encoding, content, force_ignore) {
                Some(text) => {
                    *content = text.into_bytes();
                    return true;
                }
                None => log::warn(logging, &format!("detected encoding '{label}' invalid")),
            },
            None => log::warn(logging, &format!("detected encoding '{label}' unknown")),
        }
    }

    if std::str::from_utf8(content).is_ok() {
        return true;
    }
    let text = encoding_rs::mem::decode_latin1(content).into_owned();
    *content = text.into_bytes();
    true
}

/// Resolves a label, treating labels that map to the replacement
/// encoding (ISO-2022-KR, HZ-GB-2312 and friends) as unknown.
fn encoding_for(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.as_bytes())
        .filter(|encoding| *encoding != encoding_rs::REPLACEMENT)
}

fn transcode(encoding: &'static Encoding, bytes: &[u8], force_ignore: bool) -> Option<String> {
    if force_ignore {
        let (text, _had_errors) = encoding.decode_without_bom_handling(bytes);
        Some(text.into_owned())
    } else {
        encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(Cow::into_owned)
    }
}

fn declared_in_content(content: &[u8]) -> Option<String> {
    let captures = ENC_FROM_CONTENT.captures(content)?;
    let label = (1..=3).find_map(|group| captures.get(group))?;
    Some(String::from_utf8_lossy(label.as_bytes()).into_owned())
}

fn declared_in_ctype(content_type: &str) -> Option<String> {
    ENC_FROM_CTYPE
        .captures(content_type)
        .and_then(|captures| captures.get(1))
        .map(|label| label.as_str().to_owned())
}

fn normalize_label(label: String) -> String {
    if ENC_MATCH_UTF8.is_match(&label) {
        "UTF-8".to_owned()
    } else {
        label
    }
}
