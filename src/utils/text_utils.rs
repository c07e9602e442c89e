use regex::Regex;
use lazy_static::lazy_static;

// Stole this from StackOverflow, of course
// https://stackoverflow.com/questions/53570839/quick-function-to-convert-a-strings-first-letter-to-uppercase
pub fn first_letter_to_upper(s1: String) -> String {
  let mut c = s1.chars();
  match c.next() {
    None => String::new(),
    Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
  }
}

// Capitalizes every word, the rest of each word goes
// lowercase. "namma tumkur" -> "Namma Tumkur".
pub fn title_case(s: &str) -> String {
  s.split(' ')
    .map(|w| first_letter_to_upper(w.to_lowercase()))
    .collect::<Vec<String>>()
    .join(" ")
}

// Same rules as the "secure_filename" everyone copies
// around: ASCII only, path separators and whitespace
// become underscores, anything outside [A-Za-z0-9_.-]
// is dropped and leading/trailing dots and underscores
// are trimmed. Can return an empty string, callers have
// to deal with it.
pub fn secure_filename(filename: &str) -> String {
  lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(
      r"[^A-Za-z0-9_.-]"
    ).unwrap();
  }
  let ascii: String = filename.chars()
    .filter(char::is_ascii)
    .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
    .collect();
  let joined = ascii.split_whitespace()
    .collect::<Vec<&str>>()
    .join("_");
  UNSAFE_CHARS.replace_all(&joined, "")
    .trim_matches(|c| c == '.' || c == '_')
    .to_string()
}

// Extension check only, we never look at the content.
pub fn has_pdf_extension(filename: &str) -> bool {
  filename.to_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test] 
  fn first_letter_to_upper_on_two_words() {
    let sut = String::from("hello world");
    let expected = String::from("Hello world");
    assert_eq!(first_letter_to_upper(sut), expected);
  }

  #[test]
  fn title_case_capitalizes_each_word() {
    assert_eq!(title_case("todays paper"), "Todays Paper");
    assert_eq!(title_case("NAMMA tumkur"), "Namma Tumkur");
  }

  #[test]
  fn secure_filename_strips_path_traversal() {
    assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
    assert_eq!(secure_filename("..\\..\\boot.ini"), "boot.ini");
  }

  #[test]
  fn secure_filename_replaces_whitespace_and_drops_junk() {
    assert_eq!(secure_filename("My cool paper.pdf"), "My_cool_paper.pdf");
    assert_eq!(secure_filename("édition  du*jour?.pdf"), "dition_dujour.pdf");
  }

  #[test]
  fn secure_filename_can_end_up_empty() {
    assert_eq!(secure_filename("../.."), "");
  }

  #[test]
  fn pdf_extension_is_case_insensitive() {
    assert!(has_pdf_extension("Issue.PDF"));
    assert!(has_pdf_extension("issue.pdf"));
    assert!(!has_pdf_extension("issue.pdf.png"));
    assert!(!has_pdf_extension(""));
  }

}
