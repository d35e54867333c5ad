// src/services/user_admin.rs

use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::user::{User, UserAction},
    utils::jwt::CurrentUser,
};

/// The three permission flags an admin can flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub is_staff: bool,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl From<&User> for Flags {
    fn from(user: &User) -> Self {
        Self {
            is_staff: user.is_staff,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
        }
    }
}

/// Granting superuser also grants staff; revoking it leaves staff alone.
pub fn toggled(flags: Flags, action: UserAction) -> Flags {
    match action {
        UserAction::ToggleStaff => Flags {
            is_staff: !flags.is_staff,
            ..flags
        },
        UserAction::ToggleActive => Flags {
            is_active: !flags.is_active,
            ..flags
        },
        UserAction::ToggleSuperuser => {
            let is_superuser = !flags.is_superuser;
            Flags {
                is_superuser,
                is_staff: flags.is_staff || is_superuser,
                ..flags
            }
        }
    }
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await
}

/// Applies `action` to the target account on behalf of `actor`.
pub async fn apply_action(
    pool: &SqlitePool,
    actor: &CurrentUser,
    target_id: i64,
    action: UserAction,
) -> Result<User, AppError> {
    let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(target_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    if target.id == actor.id {
        tracing::warn!("User {} tried to change their own permissions", actor.id);
        return Err(AppError::BadRequest(
            "You cannot change your own admin permissions.".to_string(),
        ));
    }

    let flags = toggled(Flags::from(&target), action);
    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET is_staff = ?, is_active = ?, is_superuser = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(flags.is_staff)
    .bind(flags.is_active)
    .bind(flags.is_superuser)
    .bind(target.id)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update user flags: {:?}", e);
        AppError::from(e)
    })?;

    tracing::info!(
        "User {} applied {:?} to {}",
        actor.username,
        action,
        updated.username
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_user, memory_pool};

    const PLAIN: Flags = Flags {
        is_staff: false,
        is_active: true,
        is_superuser: false,
    };

    #[test]
    fn granting_superuser_grants_staff() {
        let granted = toggled(PLAIN, UserAction::ToggleSuperuser);
        assert!(granted.is_superuser && granted.is_staff);

        let revoked = toggled(granted, UserAction::ToggleSuperuser);
        assert!(!revoked.is_superuser);
        assert!(revoked.is_staff);
    }

    #[test]
    fn staff_and_active_toggle_independently() {
        assert_eq!(
            toggled(PLAIN, UserAction::ToggleStaff),
            Flags {
                is_staff: true,
                ..PLAIN
            }
        );
        assert_eq!(
            toggled(PLAIN, UserAction::ToggleActive),
            Flags {
                is_active: false,
                ..PLAIN
            }
        );
    }

    async fn actor(pool: &SqlitePool) -> CurrentUser {
        let id = create_user(pool, "root", true).await;
        CurrentUser {
            id,
            username: "root".to_string(),
            is_staff: true,
            is_superuser: true,
        }
    }

    #[tokio::test]
    async fn self_toggle_is_rejected_without_changes() {
        let pool = memory_pool().await;
        let me = actor(&pool).await;

        let err = apply_action(&pool, &me, me.id, UserAction::ToggleStaff)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let is_staff: bool = sqlx::query_scalar("SELECT is_staff FROM users WHERE id = ?")
            .bind(me.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(is_staff);
    }

    #[tokio::test]
    async fn toggles_target_and_reports_missing_users() {
        let pool = memory_pool().await;
        let me = actor(&pool).await;
        let target = create_user(&pool, "student", false).await;

        let updated = apply_action(&pool, &me, target, UserAction::ToggleActive)
            .await
            .unwrap();
        assert!(!updated.is_active);

        let updated = apply_action(&pool, &me, target, UserAction::ToggleSuperuser)
            .await
            .unwrap();
        assert!(updated.is_superuser && updated.is_staff);

        assert!(matches!(
            apply_action(&pool, &me, 9999, UserAction::ToggleStaff).await,
            Err(AppError::NotFound(_))
        ));

        let users = list_users(&pool).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "student");
    }
}
