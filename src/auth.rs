//! Email/password authentication with bcrypt.
//!
//! Provides first-run admin setup, user management, login with lockout
//! tracking, bearer-token sessions and permission checking. Password hashes
//! live in the `users` table; lockout counters are persisted per e-mail in
//! `local_settings` (category "lockout") so they survive a restart. Sessions
//! are kept in memory only.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::{AppConfig, MAX_SESSION_HOURS, MAX_SESSION_IDLE_MINUTES};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::input;
use crate::models::{User, UserRole};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const MIN_PASSWORD_LEN: usize = 8;
const LOCKOUT_CATEGORY: &str = "lockout";

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

pub mod perm {
    pub const VIEW_RECORDS: &str = "view_records";
    pub const CREATE_TRIP: &str = "create_trip";
    pub const CREATE_GC_NOTE: &str = "create_gc_note";
    pub const UPDATE_STATUS: &str = "update_status";
    pub const RECORD_PAYMENT: &str = "record_payment";
    pub const VIEW_REPORTS: &str = "view_reports";
    pub const DELETE_RECORDS: &str = "delete_records";
    pub const MANAGE_MASTER_DATA: &str = "manage_master_data";
    pub const MANAGE_USERS: &str = "manage_users";
    pub const SYSTEM_SETTINGS: &str = "system_settings";
}

/// Permissions granted to administrators.
const ADMIN_PERMISSIONS: &[&str] = &[
    perm::VIEW_RECORDS,
    perm::CREATE_TRIP,
    perm::CREATE_GC_NOTE,
    perm::UPDATE_STATUS,
    perm::RECORD_PAYMENT,
    perm::VIEW_REPORTS,
    perm::DELETE_RECORDS,
    perm::MANAGE_MASTER_DATA,
    perm::MANAGE_USERS,
    perm::SYSTEM_SETTINGS,
];

/// Permissions granted to clerks.
const CLERK_PERMISSIONS: &[&str] = &[
    perm::VIEW_RECORDS,
    perm::CREATE_TRIP,
    perm::CREATE_GC_NOTE,
    perm::UPDATE_STATUS,
    perm::RECORD_PAYMENT,
    perm::VIEW_REPORTS,
];

pub fn permissions_for(role: UserRole) -> &'static [&'static str] {
    match role {
        UserRole::Admin => ADMIN_PERMISSIONS,
        UserRole::Clerk => CLERK_PERMISSIONS,
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An active login session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    #[serde(skip)]
    pub token: String,
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub permissions: Vec<String>,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Expired once past the hard limit or idle longer than `idle`.
    fn is_expired(&self, idle: Duration, now: DateTime<Utc>) -> bool {
        now >= self.expires_at || now - self.last_activity > idle
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn require(&self, permission: &str) -> AppResult<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} role lacks permission {permission}",
                self.role
            )))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    pub permissions: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub idle_minutes: i64,
    pub max_hours: i64,
}

/// Lockout tracking entry.
struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

/// In-memory session registry.
pub struct AuthState {
    sessions: Mutex<HashMap<String, Session>>,
    idle: Duration,
    max: Duration,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl AuthState {
    /// Windows outside `1..=MAX_SESSION_IDLE_MINUTES` minutes and
    /// `1..=MAX_SESSION_HOURS` hours are clamped.
    pub fn new(idle_minutes: i64, max_hours: i64) -> Self {
        let idle = Duration::try_minutes(idle_minutes.clamp(1, MAX_SESSION_IDLE_MINUTES))
            .unwrap_or_else(|| Duration::minutes(MAX_SESSION_IDLE_MINUTES));
        let max = Duration::try_hours(max_hours.clamp(1, MAX_SESSION_HOURS))
            .unwrap_or_else(|| Duration::hours(MAX_SESSION_HOURS));
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle,
            max,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.session_idle_minutes, config.session_max_hours)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create_session(&self, user: &User) -> Session {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            permissions: permissions_for(user.role)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            login_time: now,
            last_activity: now,
            expires_at: now.checked_add_signed(self.max).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let mut sessions = self.sessions();
        sessions.retain(|_, s| !s.is_expired(self.idle, now));
        sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Look up a token, refreshing its inactivity timer. Expired sessions
    /// are dropped.
    pub fn validate(&self, token: &str) -> AppResult<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions();
        match sessions.get_mut(token) {
            None => return Err(AppError::Unauthorized("session not found".into())),
            Some(session) if !session.is_expired(self.idle, now) => {
                session.last_activity = now;
                return Ok(session.clone());
            }
            Some(_) => {}
        }
        sessions.remove(token);
        Err(AppError::Unauthorized("session expired".into()))
    }

    pub fn logout(&self, token: &str) -> bool {
        let removed = self.sessions().remove(token);
        if let Some(session) = &removed {
            info!(user_id = %session.user_id, "session logged out");
        }
        removed.is_some()
    }

    /// Drop every session of a user (after deletion or a role change).
    pub fn revoke_user(&self, user_id: &str) {
        self.sessions().retain(|_, s| s.user_id != user_id);
    }

    pub fn session_stats(&self) -> SessionStats {
        let now = Utc::now();
        let active = self
            .sessions()
            .values()
            .filter(|s| !s.is_expired(self.idle, now))
            .count();
        SessionStats {
            active_sessions: active,
            idle_minutes: self.idle.num_minutes(),
            max_hours: self.max.num_hours(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lockout
// ---------------------------------------------------------------------------

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_lockout(lockout: &LockoutEntry) -> AppResult<()> {
    if lockout.attempts >= MAX_FAILED_ATTEMPTS {
        let elapsed = Utc::now() - lockout.last_attempt;
        if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
            let remaining = (LOCKOUT_MINUTES - elapsed.num_minutes()).max(1);
            return Err(AppError::Locked(format!(
                "Too many failed attempts. Try again in {remaining} minute(s)."
            )));
        }
    }
    Ok(())
}

fn load_lockout_from_db(conn: &Connection, email: &str) -> LockoutEntry {
    let attempts = db::get_setting(conn, LOCKOUT_CATEGORY, &format!("{email}:attempts"))
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let last_attempt = db::get_setting(conn, LOCKOUT_CATEGORY, &format!("{email}:last_attempt"))
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    LockoutEntry {
        attempts,
        last_attempt,
    }
}

fn persist_lockout_to_db(conn: &Connection, email: &str, lockout: &LockoutEntry) -> AppResult<()> {
    db::set_setting(
        conn,
        LOCKOUT_CATEGORY,
        &format!("{email}:attempts"),
        &lockout.attempts.to_string(),
    )?;
    db::set_setting(
        conn,
        LOCKOUT_CATEGORY,
        &format!("{email}:last_attempt"),
        &lockout.last_attempt.to_rfc3339(),
    )
}

fn clear_lockout(conn: &Connection, email: &str) -> AppResult<()> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key IN (?2, ?3)",
        params![
            LOCKOUT_CATEGORY,
            format!("{email}:attempts"),
            format!("{email}:last_attempt")
        ],
    )?;
    Ok(())
}

/// Drop counters whose last failed attempt is older than the lockout window,
/// so guesses at unknown addresses do not accumulate. Returns how many
/// e-mails were cleared.
fn prune_stale_lockouts(conn: &Connection) -> AppResult<usize> {
    let cutoff = Utc::now() - Duration::minutes(LOCKOUT_MINUTES);
    let stale: Vec<String> = db::get_settings_in_category(conn, LOCKOUT_CATEGORY)?
        .into_iter()
        .filter_map(|(key, value)| {
            let email = key.strip_suffix(":last_attempt")?;
            let last = DateTime::parse_from_rfc3339(&value).ok()?;
            (last.with_timezone(&Utc) < cutoff).then(|| email.to_string())
        })
        .collect();
    for email in &stale {
        clear_lockout(conn, email)?;
    }
    Ok(stale.len())
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Verify credentials and open a session. Unknown e-mail and wrong password
/// produce the same error.
pub fn login(
    conn: &Connection,
    auth: &AuthState,
    email: &str,
    password: &Zeroizing<String>,
) -> AppResult<LoginResponse> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::validation("email and password are required"));
    }

    let mut lockout = load_lockout_from_db(conn, &email);
    check_lockout(&lockout)?;

    let found: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE email = ?1",
            params![email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let verified = match &found {
        Some((_, hash)) => bcrypt::verify(password.as_str(), hash).unwrap_or(false),
        None => false,
    };

    let user_id = match (verified, found) {
        (true, Some((id, _))) => id,
        _ => {
            lockout.attempts += 1;
            lockout.last_attempt = Utc::now();
            persist_lockout_to_db(conn, &email, &lockout)?;
            let pruned = prune_stale_lockouts(conn)?;
            if pruned > 0 {
                debug!(pruned, "cleared stale lockout counters");
            }
            warn!(email = %email, attempts = lockout.attempts, "failed login attempt");
            return Err(AppError::Unauthorized("Invalid email or password".into()));
        }
    };

    if lockout.attempts > 0 {
        clear_lockout(conn, &email)?;
    }

    let user = get_user(conn, &user_id)?;
    let session = auth.create_session(&user);
    info!(user_id = %user.id, role = %user.role, "login successful");

    Ok(LoginResponse {
        token: session.token,
        permissions: session.permissions,
        expires_at: session.expires_at,
        user,
    })
}

// ---------------------------------------------------------------------------
// User management
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    #[serde(default = "default_role")]
    pub role: UserRole,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub password: String,
}

fn default_role() -> UserRole {
    UserRole::Clerk
}

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub role: Option<UserRole>,
    pub password: Option<String>,
}

fn hash_password(password: &Zeroizing<String>) -> AppResult<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    bcrypt::hash(password.as_str(), BCRYPT_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

pub fn user_count(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

/// Create the first administrator. Refused once any user exists.
pub fn setup_first_admin(conn: &Connection, input: NewUser) -> AppResult<User> {
    if user_count(conn)? > 0 {
        return Err(AppError::Conflict("setup already completed".into()));
    }
    create_user(
        conn,
        NewUser {
            role: UserRole::Admin,
            ..input
        },
    )
}

pub fn create_user(conn: &Connection, input: NewUser) -> AppResult<User> {
    let password = Zeroizing::new(input.password);
    let email = normalize_email(&input.email);
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(AppError::validation(format!("invalid email: {email:?}")));
    }
    let full_name = input::required(&input.full_name, "full_name")?;
    let hash = hash_password(&password)?;

    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO users (id, email, full_name, role, phone_number, password_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            email,
            full_name,
            input.role,
            input::optional_text(input.phone_number),
            hash,
            now
        ],
    )?;
    info!(user_id = %id, role = %input.role, "user created");
    get_user(conn, &id)
}

pub fn get_user(conn: &Connection, id: &str) -> AppResult<User> {
    conn.query_row(
        "SELECT * FROM users WHERE id = ?1",
        params![id],
        User::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("user", id))
}

pub fn list_users(conn: &Connection) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare("SELECT * FROM users ORDER BY full_name COLLATE NOCASE")?;
    let users = stmt
        .query_map([], User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

fn admin_count(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        params![UserRole::Admin],
        |row| row.get(0),
    )?)
}

/// Apply a profile, role or password change. Nothing is written unless every
/// field is valid; the last administrator cannot be demoted.
pub fn update_user(conn: &Connection, id: &str, update: UserUpdate) -> AppResult<User> {
    let mut user = get_user(conn, id)?;
    if let Some(name) = update.full_name {
        user.full_name = input::required(&name, "full_name")?;
    }
    if update.phone_number.is_some() {
        user.phone_number = input::optional_text(update.phone_number);
    }
    if let Some(role) = update.role {
        if user.role == UserRole::Admin && role != UserRole::Admin && admin_count(conn)? <= 1 {
            return Err(AppError::Conflict(
                "cannot demote the last administrator".into(),
            ));
        }
        user.role = role;
    }
    let password_hash = update
        .password
        .map(|password| hash_password(&Zeroizing::new(password)))
        .transpose()?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE users SET full_name = ?1, phone_number = ?2, role = ?3, updated_at = ?4 WHERE id = ?5",
        params![user.full_name, user.phone_number, user.role, db::now_ts(), id],
    )?;
    if let Some(hash) = &password_hash {
        tx.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![hash, id],
        )?;
    }
    tx.commit()?;

    if password_hash.is_some() {
        info!(user_id = %id, "password changed");
    }
    get_user(conn, id)
}

/// Delete a user. An account cannot delete itself.
pub fn delete_user(conn: &Connection, acting_user_id: &str, id: &str) -> AppResult<()> {
    if acting_user_id == id {
        return Err(AppError::Conflict("you cannot delete your own account".into()));
    }
    let n = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(AppError::not_found("user", id));
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pw(s: &str) -> Zeroizing<String> {
        Zeroizing::new(s.to_string())
    }

    fn new_user(email: &str, role: UserRole) -> NewUser {
        NewUser {
            email: email.into(),
            full_name: "Priya Raman".into(),
            role,
            phone_number: Some("9876543210".into()),
            password: "correct-horse".into(),
        }
    }

    fn lockout_attempts(conn: &Connection, email: &str) -> u32 {
        db::get_setting(conn, LOCKOUT_CATEGORY, &format!("{email}:attempts"))
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    }

    #[test]
    fn first_admin_setup_only_once() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let admin = setup_first_admin(&conn, new_user("Owner@Example.com", UserRole::Clerk))
            .expect("setup");
        assert_eq!(admin.role, UserRole::Admin);
        assert_eq!(admin.email, "owner@example.com");

        let err = setup_first_admin(&conn, new_user("second@example.com", UserRole::Admin))
            .expect_err("second setup");
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn duplicate_email_is_conflict_regardless_of_case() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        create_user(&conn, new_user("clerk@example.com", UserRole::Clerk)).expect("create");
        let err = create_user(&conn, new_user("CLERK@example.com", UserRole::Clerk))
            .expect_err("dup");
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn short_password_is_rejected() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let mut input = new_user("a@example.com", UserRole::Clerk);
        input.password = "short".into();
        let err = create_user(&conn, input).expect_err("short");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn login_issues_session_with_role_permissions() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        create_user(&conn, new_user("clerk@example.com", UserRole::Clerk)).expect("create");
        let auth = AuthState::new(60, 12);

        let resp = login(&conn, &auth, " Clerk@Example.com ", &pw("correct-horse")).expect("login");
        assert_eq!(resp.user.role, UserRole::Clerk);
        assert_eq!(resp.permissions.len(), CLERK_PERMISSIONS.len());

        let session = auth.validate(&resp.token).expect("valid");
        assert!(session.require(perm::CREATE_GC_NOTE).is_ok());
        assert!(matches!(
            session.require(perm::MANAGE_USERS),
            Err(AppError::Forbidden(_))
        ));

        assert!(auth.logout(&resp.token));
        assert!(auth.validate(&resp.token).is_err());
    }

    #[test]
    fn unknown_email_and_wrong_password_look_the_same() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        create_user(&conn, new_user("clerk@example.com", UserRole::Clerk)).expect("create");
        let auth = AuthState::default();

        let a = login(&conn, &auth, "clerk@example.com", &pw("wrong-password")).expect_err("a");
        let b = login(&conn, &auth, "nobody@example.com", &pw("correct-horse")).expect_err("b");
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn idle_sessions_expire() {
        let auth = AuthState::new(1, 12);
        let user = User {
            id: "u1".into(),
            email: "x@example.com".into(),
            full_name: "X".into(),
            role: UserRole::Admin,
            phone_number: None,
            created_at: db::now_ts(),
            updated_at: db::now_ts(),
        };
        let session = auth.create_session(&user);
        {
            let mut sessions = auth.sessions();
            let s = sessions.get_mut(&session.token).expect("session");
            s.last_activity = Utc::now() - Duration::minutes(5);
        }
        let err = auth.validate(&session.token).expect_err("expired");
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert_eq!(auth.session_stats().active_sessions, 0);
    }

    #[test]
    fn lockout_persists_across_auth_state_restart() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        create_user(&conn, new_user("clerk@example.com", UserRole::Clerk)).expect("create");
        let auth_before_restart = AuthState::default();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let err = login(&conn, &auth_before_restart, "clerk@example.com", &pw("bad-guess-1"))
                .expect_err("invalid login should fail");
            assert!(matches!(err, AppError::Unauthorized(_)));
        }
        assert_eq!(lockout_attempts(&conn, "clerk@example.com"), MAX_FAILED_ATTEMPTS);

        let auth_after_restart = AuthState::default();
        let err = login(&conn, &auth_after_restart, "clerk@example.com", &pw("correct-horse"))
            .expect_err("lockout should remain active after restart");
        assert!(matches!(err, AppError::Locked(_)), "got {err:?}");
        assert_eq!(
            lockout_attempts(&conn, "clerk@example.com"),
            MAX_FAILED_ATTEMPTS,
            "blocked attempt should not increment counter while lockout is active"
        );

        // Other accounts are unaffected.
        assert_eq!(lockout_attempts(&conn, "admin@example.com"), 0);
    }

    #[test]
    fn successful_login_resets_persisted_lockout() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        create_user(&conn, new_user("clerk@example.com", UserRole::Clerk)).expect("create");

        let auth = AuthState::default();
        for _ in 0..2 {
            login(&conn, &auth, "clerk@example.com", &pw("bad-guess-1")).expect_err("bad");
        }
        assert_eq!(lockout_attempts(&conn, "clerk@example.com"), 2);

        login(&conn, &AuthState::default(), "clerk@example.com", &pw("correct-horse"))
            .expect("valid login should succeed");
        assert_eq!(lockout_attempts(&conn, "clerk@example.com"), 0);
    }

    #[test]
    fn update_and_delete_users() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let admin = create_user(&conn, new_user("admin@example.com", UserRole::Admin)).expect("a");
        let clerk = create_user(&conn, new_user("clerk@example.com", UserRole::Clerk)).expect("c");

        let updated = update_user(
            &conn,
            &clerk.id,
            UserUpdate {
                role: Some(UserRole::Admin),
                password: Some("new-password-1".into()),
                ..Default::default()
            },
        )
        .expect("update");
        assert_eq!(updated.role, UserRole::Admin);
        login(&conn, &AuthState::default(), "clerk@example.com", &pw("new-password-1"))
            .expect("new password works");

        let err = delete_user(&conn, &admin.id, &admin.id).expect_err("self delete");
        assert!(matches!(err, AppError::Conflict(_)));
        delete_user(&conn, &admin.id, &clerk.id).expect("delete");
        assert_eq!(list_users(&conn).expect("list").len(), 1);
    }

    #[test]
    fn rejected_update_leaves_user_unchanged() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let clerk = create_user(&conn, new_user("clerk@example.com", UserRole::Clerk)).expect("c");

        let err = update_user(
            &conn,
            &clerk.id,
            UserUpdate {
                full_name: Some("Renamed".into()),
                role: Some(UserRole::Admin),
                password: Some("x".into()),
                ..Default::default()
            },
        )
        .expect_err("short password");
        assert!(matches!(err, AppError::Validation(_)));

        let stored = get_user(&conn, &clerk.id).expect("get");
        assert_eq!(stored.role, UserRole::Clerk);
        assert_eq!(stored.full_name, "Priya Raman");
        login(&conn, &AuthState::default(), "clerk@example.com", &pw("correct-horse"))
            .expect("old password still works");
    }

    #[test]
    fn last_admin_cannot_be_demoted() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let admin = create_user(&conn, new_user("admin@example.com", UserRole::Admin)).expect("a");
        let demote = || UserUpdate {
            role: Some(UserRole::Clerk),
            ..Default::default()
        };

        let err = update_user(&conn, &admin.id, demote()).expect_err("last admin");
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(get_user(&conn, &admin.id).expect("get").role, UserRole::Admin);

        let second = create_user(&conn, new_user("owner@example.com", UserRole::Admin)).expect("b");
        let updated = update_user(&conn, &admin.id, demote()).expect("two admins");
        assert_eq!(updated.role, UserRole::Clerk);
        let err = update_user(&conn, &second.id, demote()).expect_err("now the last one");
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn oversized_session_windows_are_clamped() {
        let auth = AuthState::new(i64::MAX, 10_000_000_000_000);
        let stats = auth.session_stats();
        assert_eq!(stats.idle_minutes, MAX_SESSION_IDLE_MINUTES);
        assert_eq!(stats.max_hours, MAX_SESSION_HOURS);
    }

    #[test]
    fn stale_lockout_counters_are_pruned() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let long_ago = (Utc::now() - Duration::hours(2)).to_rfc3339();
        for i in 0..20 {
            let email = format!("guess{i}@example.com");
            db::set_setting(&conn, LOCKOUT_CATEGORY, &format!("{email}:attempts"), "1")
                .expect("attempts");
            db::set_setting(&conn, LOCKOUT_CATEGORY, &format!("{email}:last_attempt"), &long_ago)
                .expect("last attempt");
        }

        login(&conn, &AuthState::default(), "nobody@example.com", &pw("correct-horse"))
            .expect_err("unknown email");

        let keys: Vec<String> = db::get_settings_in_category(&conn, LOCKOUT_CATEGORY)
            .expect("settings")
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "nobody@example.com:attempts".to_string(),
                "nobody@example.com:last_attempt".to_string()
            ]
        );
    }
}
