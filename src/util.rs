//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads. Cuts on a char
/// boundary since model output is mostly Chinese.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while cut > 0 && !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_every_placeholder() {
    let out = fill_template("主题:{topic} 难度:{difficulty} 共{count}题", &[
      ("topic", "JavaScript"),
      ("difficulty", "medium"),
      ("count", "3"),
    ]);
    assert_eq!(out, "主题:JavaScript 难度:medium 共3题");
  }

  #[test]
  fn trunc_for_log_never_splits_a_char() {
    assert_eq!(trunc_for_log("short", 10), "short");
    let cut = trunc_for_log("一二三四五", 4);
    assert!(cut.starts_with("一"));
    assert!(cut.contains("bytes total"));
  }
}
