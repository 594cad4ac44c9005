//! Input validation for request payloads.
//!
//! Each `validate_*` function trims what the client sent, collects every problem into
//! `FieldErrors`, and returns the cleaned values when nothing failed.

use crate::{
    error::{AppError, FieldErrors},
    models::{CommentForm, GroupForm, PasswordChangeForm, PostForm, SignupForm},
    storage::IMAGE_PREFIX,
};

pub const REQUIRED: &str = "This field is required.";
pub const GROUP_TITLE_MAX: usize = 200;
pub const GROUP_SLUG_MAX: usize = 50;
pub const USERNAME_MAX: usize = 150;
pub const PASSWORD_MIN: usize = 8;
/// Width of the `posts.image` column.
pub const IMAGE_KEY_MAX: usize = 100;

/// CleanPost
///
/// A validated post form. Group existence is checked by the handler against the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanPost {
    pub text: String,
    pub group: Option<i64>,
    /// `None` leaves the stored image alone on edit.
    pub image: Option<String>,
    /// Detach the current image. Never set together with `image`.
    pub clear_image: bool,
}

pub fn validate_post(form: PostForm) -> Result<CleanPost, AppError> {
    let mut errors = FieldErrors::new();

    let text = form.text.trim().to_string();
    if text.is_empty() {
        errors.add("text", REQUIRED);
    }

    let image = match form.image.map(|key| key.trim().to_string()) {
        Some(key) if key.is_empty() => None,
        Some(key) => {
            if let Err(msg) = validate_image_key(&key) {
                errors.add("image", msg);
            }
            Some(key)
        }
        None => None,
    };
    if form.clear_image && image.is_some() {
        errors.add(
            "image",
            "Please either submit a file or check the clear checkbox, not both.",
        );
    }

    errors.into_result()?;
    Ok(CleanPost {
        text,
        group: form.group,
        image,
        clear_image: form.clear_image,
    })
}

/// Image keys must point inside the `posts/` prefix that upload URLs are issued for.
pub fn validate_image_key(key: &str) -> Result<(), &'static str> {
    if !key.starts_with(IMAGE_PREFIX) || key.len() <= IMAGE_PREFIX.len() {
        return Err("Image must be uploaded through /upload/presigned.");
    }
    if key.len() > IMAGE_KEY_MAX {
        return Err("Ensure the image name has at most 100 characters.");
    }
    if key.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err("Image key must not contain relative segments.");
    }
    Ok(())
}

pub fn validate_comment(form: CommentForm) -> Result<String, AppError> {
    let text = form.text.trim().to_string();
    if text.is_empty() {
        let mut errors = FieldErrors::new();
        errors.add("text", REQUIRED);
        return Err(AppError::Validation(errors));
    }
    Ok(text)
}

pub fn validate_group(form: GroupForm) -> Result<GroupForm, AppError> {
    let mut errors = FieldErrors::new();

    let title = form.title.trim().to_string();
    if title.is_empty() {
        errors.add("title", REQUIRED);
    } else if title.chars().count() > GROUP_TITLE_MAX {
        errors.add("title", format!("Ensure this value has at most {GROUP_TITLE_MAX} characters."));
    }

    let slug = form.slug.trim().to_string();
    if slug.is_empty() {
        errors.add("slug", REQUIRED);
    } else {
        if slug.len() > GROUP_SLUG_MAX {
            errors.add("slug", format!("Ensure this value has at most {GROUP_SLUG_MAX} characters."));
        }
        if !slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            errors.add(
                "slug",
                "Use only Latin letters, digits, hyphens and underscores.",
            );
        }
    }

    let description = form.description.trim().to_string();
    if description.is_empty() {
        errors.add("description", REQUIRED);
    }

    errors.into_result()?;
    Ok(GroupForm {
        title,
        slug,
        description,
    })
}

/// 1..=150 letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.is_empty() {
        return Err(REQUIRED);
    }
    if username.chars().count() > USERNAME_MAX {
        return Err("Username must be at most 150 characters long.");
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err("Username may contain only letters, digits and @/./+/-/_ characters.");
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return Err("Enter a valid email address.");
    };
    if local.is_empty()
        || domain.len() < 3
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err("Enter a valid email address.");
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < PASSWORD_MIN {
        return Err("This password is too short. It must contain at least 8 characters.");
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err("This password is entirely numeric.");
    }
    Ok(())
}

pub fn validate_signup(form: SignupForm) -> Result<SignupForm, AppError> {
    let mut errors = FieldErrors::new();

    let username = form.username.trim().to_string();
    if let Err(msg) = validate_username(&username) {
        errors.add("username", msg);
    }

    // Email is optional, but when given it has to be well formed.
    let email = form.email.trim().to_string();
    if !email.is_empty() {
        if let Err(msg) = validate_email(&email) {
            errors.add("email", msg);
        }
    }

    if form.password.is_empty() {
        errors.add("password", REQUIRED);
    } else if let Err(msg) = validate_password(&form.password) {
        errors.add("password", msg);
    }
    if form.password != form.password_confirm {
        errors.add("password_confirm", "The two password fields didn't match.");
    }

    errors.into_result()?;
    Ok(SignupForm {
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        username,
        email,
        password: form.password,
        password_confirm: form.password_confirm,
    })
}

/// Checks the new password pair. The old password is verified against the stored hash by the handler.
pub fn validate_password_change(form: &PasswordChangeForm) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    if form.old_password.is_empty() {
        errors.add("old_password", REQUIRED);
    }
    if let Err(msg) = validate_password(&form.new_password) {
        errors.add("new_password", msg);
    }
    if form.new_password != form.new_password_confirm {
        errors.add("new_password_confirm", "The two password fields didn't match.");
    }
    errors.into_result()
}
