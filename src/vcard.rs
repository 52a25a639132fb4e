use std::fmt::Write as _;

/// A vCard 3.0 contact card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VCard {
    pub full_name: String,
    pub given_name: String,
    pub family_name: String,
    pub phone: String,
    pub email: String,
    pub street: String,
    pub locality: String,
    pub region: String,
    pub country: String,
    pub url: String,
    pub title: String,
    pub org: String,
    pub note: String,
}

impl VCard {
    pub const CONTENT_TYPE: &'static str = "text/vcard; charset=utf-8";

    pub fn render(&self) -> String {
        let mut card = String::from("BEGIN:VCARD\r\nVERSION:3.0\r\n");

        line(&mut card, "FN", &escape(&self.full_name));
        line(
            &mut card,
            "N",
            &format!("{};{};;;", escape(&self.family_name), escape(&self.given_name)),
        );
        optional(&mut card, "TEL;TYPE=CELL", &self.phone);
        optional(&mut card, "EMAIL;TYPE=INTERNET", &self.email);

        let has_address = [&self.street, &self.locality, &self.region, &self.country]
            .iter()
            .any(|part| !part.is_empty());
        if has_address {
            let address = format!(
                ";;{};{};{};;{}",
                escape(&self.street),
                escape(&self.locality),
                escape(&self.region),
                escape(&self.country)
            );
            line(&mut card, "ADR;TYPE=HOME", &address);
        }

        optional(&mut card, "URL", &self.url);
        optional(&mut card, "TITLE", &self.title);
        optional(&mut card, "ORG", &self.org);
        optional(&mut card, "NOTE", &self.note);

        card.push_str("END:VCARD\r\n");
        card
    }

    /// Download name of the card, e.g. `Ada_Lovelace.vcf`.
    pub fn file_name(&self) -> String {
        let name: String = self
            .full_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
            .collect();

        if name.is_empty() {
            return "contact.vcf".to_owned();
        }
        format!("{name}.vcf")
    }
}

fn line(card: &mut String, property: &str, value: &str) {
    let _ = write!(card, "{property}:{value}\r\n");
}

fn optional(card: &mut String, property: &str, value: &str) {
    if !value.is_empty() {
        line(card, property, &escape(value));
    }
}

/// Escapes a text value: backslash, comma, semicolon and newlines.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ',' => escaped.push_str("\\,"),
            ';' => escaped.push_str("\\;"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            c => escaped.push(c),
        }
    }

    escaped
}
