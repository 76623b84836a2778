//! Every piece of user-facing copy the bot sends, in one place.

use crate::auth::StudentType;

/// Prefix a word with "a" or "an" depending on its first letter.
pub fn a_or_an(word: &str) -> String {
    let starts_with_vowel = word
        .chars()
        .next()
        .map(|c| "aeiou".contains(c.to_ascii_lowercase()))
        .unwrap_or(false);
    if starts_with_vowel {
        format!("an {}", word)
    } else {
        format!("a {}", word)
    }
}

fn describe_credential(observed_code: &str) -> String {
    match StudentType::from_code(observed_code) {
        Some(student_type) => a_or_an(student_type.label()),
        None => format!("verified with code '{}'", observed_code),
    }
}

pub fn verification_instructions(username: &str, auth_link: &str, data_policy_url: &str) -> String {
    let mut message = format!(
        "Hi {}, welcome to the server! To verify that you're a student, \
        please click here and sign in within the next 10 minutes: {}",
        username, auth_link
    );
    if !data_policy_url.is_empty() {
        message.push_str(&format!(
            "\n\nCurious what happens to your data? Have a read of our data policy: {}",
            data_policy_url
        ));
    }
    message
}

pub fn verification_button_prompt() -> String {
    "All signed in? Hit the button below and I'll double-check.".to_string()
}

pub fn five_minute_warning() -> String {
    "Just a heads up - you've got five minutes left to verify before I'll have to \
    remove you from the server."
        .to_string()
}

pub fn verification_success() -> String {
    "Thanks! You're now verified. Have a great day!".to_string()
}

pub fn already_verified_exit() -> String {
    "Looks like you've already been verified while I was waiting - no further action \
    needed. Have a great day!"
        .to_string()
}

pub fn verification_started_ack() -> String {
    "Verification started! Check your DMs 📬".to_string()
}

pub fn timeout_farewell() -> String {
    "Whoops - time's up, and it doesn't look like you've verified. Please try joining \
    the server again."
        .to_string()
}

pub fn invalid_claim_farewell() -> String {
    "Sorry, that doesn't look like you authenticated successfully. Please try joining \
    the server again."
        .to_string()
}

/// The member holds a real credential, just not the kind this guild accepts.
pub fn wrong_student_type_farewell(
    guild_name: &str,
    observed_code: &str,
    required: StudentType,
) -> String {
    format!(
        "Sorry - our records show you're {}, but the {} server is only open to {}. \
        We've had to say goodbye for now, but you're welcome back if that changes.",
        describe_credential(observed_code),
        guild_name,
        required.plural_label()
    )
}

pub fn invalid_member_warning(
    guild_name: &str,
    timeframe: &str,
    observed_code: &str,
    required: StudentType,
) -> String {
    let status = if observed_code.is_empty() {
        "Our records show you haven't verified as a student yet.".to_string()
    } else {
        format!("Our records show you're {}.", describe_credential(observed_code))
    };
    format!(
        "Hi! We're having a tidy-up of the {} server. {} This server is for {}, so \
        unless you verify within {}, we'll have to remove you. Hit the button below \
        to get started.",
        guild_name,
        status,
        required.plural_label(),
        timeframe
    )
}

pub fn purge_farewell(guild_name: &str) -> String {
    format!(
        "You weren't verified for the {} server for this academic year, so we've had \
        to say goodbye for now. Need to reverify? Hit the button below.\n\
        No longer the right server for you? Reach out to the committee to find out more.",
        guild_name
    )
}
