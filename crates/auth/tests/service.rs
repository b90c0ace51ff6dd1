use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use keygate_auth::{
    AuthConfig, AuthService, MenuDefinition, ModuleManifest, NewUser, PasswordHashCost,
    RegisterMenus, RegisterPermissions, TokenClaims, TokenKind, auth_manifest,
};
use keygate_core::{AuthError, Clock, FixedClock, SessionId, UserId};
use keygate_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription, subjects};
use keygate_infra::InMemoryCredentialStore;

type Service = AuthService<Arc<InMemoryCredentialStore>, Arc<InMemoryEventBus<EventEnvelope>>>;

struct Harness {
    service: Service,
    clock: Arc<FixedClock>,
    events: Subscription<EventEnvelope>,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
}

fn config() -> AuthConfig {
    AuthConfig::new("integration-secret").with_password_hash_cost(PasswordHashCost::minimal())
}

fn harness_with(config: AuthConfig) -> Harness {
    let store = Arc::new(InMemoryCredentialStore::new());
    let bus = Arc::new(InMemoryEventBus::<EventEnvelope>::new());
    let events = bus.subscribe();
    let clock = Arc::new(FixedClock::new(start()));
    let service = AuthService::new(&config, store, bus)
        .unwrap()
        .with_clock(clock.clone());
    Harness { service, clock, events }
}

fn harness() -> Harness {
    harness_with(config())
}

async fn register(h: &Harness, email: &str, password: &str) -> UserId {
    h.service
        .register(NewUser::new(email, password, "Test User"))
        .await
        .unwrap()
        .id
}

fn claims_of(h: &Harness, token: &str) -> TokenClaims {
    h.service.codec().verify(token, h.clock.now()).unwrap()
}

#[tokio::test]
async fn register_then_login_issues_ordered_expiries() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;

    let tokens = h.service.login("a@x.com", "p1").await.unwrap();
    assert!(tokens.access_expires_at < tokens.refresh_expires_at);
    assert_eq!(tokens.access_expires_at, start() + Duration::minutes(15));
    assert_eq!(tokens.refresh_expires_at, start() + Duration::days(7));

    let access = claims_of(&h, &tokens.access_token);
    let refresh = claims_of(&h, &tokens.refresh_token);
    assert_eq!(access.kind(), TokenKind::Access);
    assert_eq!(refresh.kind(), TokenKind::Refresh);
    assert_eq!(access.session_id, refresh.session_id);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;

    let wrong_password = h.service.login("a@x.com", "nope").await.unwrap_err();
    let unknown_email = h.service.login("missing@x.com", "p1").await.unwrap_err();

    assert_eq!(wrong_password, AuthError::Unauthorized);
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password.to_string(), unknown_email.to_string());
}

#[tokio::test]
async fn login_normalizes_email() {
    let h = harness();
    register(&h, "  Alice@Example.COM ", "p1").await;
    assert!(h.service.login("alice@example.com", "p1").await.is_ok());
    assert!(h.service.login("ALICE@example.com", "p1").await.is_ok());
}

#[tokio::test]
async fn duplicate_registration_is_already_exists() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;
    let err = h
        .service
        .register(NewUser::new("A@x.com", "p2", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AlreadyExists(_)));
}

#[tokio::test]
async fn malformed_registration_is_validation_failure() {
    let h = harness();
    for (email, password) in [("", "p1"), ("no-at-sign", "p1"), ("a@@x.com", "p1"), ("a@x.com", "")] {
        let err = h
            .service
            .register(NewUser::new(email, password, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)), "{email:?}/{password:?}: {err:?}");
    }
}

#[tokio::test]
async fn registration_keeps_supplied_id_and_publishes_event() {
    let h = harness();
    let id = UserId::new();
    let mut new_user = NewUser::new("a@x.com", "p1", "Ada");
    new_user.id = Some(id);

    let user = h.service.register(new_user).await.unwrap();
    assert_eq!(user.id, id);
    assert_eq!(h.service.get_me(id).await.unwrap().email, "a@x.com");

    let event = h.events.try_recv().unwrap();
    assert_eq!(event.subject(), subjects::AUTH_USER_REGISTERED);
    let payload: keygate_events::UserRegistered = event.decode().unwrap();
    assert_eq!(payload.user_id, id);
}

#[tokio::test]
async fn get_me_for_unknown_user_is_not_found() {
    let h = harness();
    assert_eq!(h.service.get_me(UserId::new()).await, Err(AuthError::NotFound));
}

#[tokio::test]
async fn rotation_invalidates_previous_refresh_token() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;
    let first = h.service.login("a@x.com", "p1").await.unwrap();

    let second = h.service.refresh_tokens(&first.refresh_token).await.unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_eq!(
        claims_of(&h, &second.refresh_token).session_id,
        claims_of(&h, &first.refresh_token).session_id
    );

    assert_eq!(
        h.service.refresh_tokens(&first.refresh_token).await,
        Err(AuthError::Unauthorized)
    );
    assert!(h.service.refresh_tokens(&second.refresh_token).await.is_ok());
}

#[tokio::test]
async fn concurrent_refreshes_of_one_token_succeed_once() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;
    let tokens = h.service.login("a@x.com", "p1").await.unwrap();

    let (a, b) = tokio::join!(
        h.service.refresh_tokens(&tokens.refresh_token),
        h.service.refresh_tokens(&tokens.refresh_token),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
}

#[tokio::test]
async fn access_token_cannot_refresh() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;
    let tokens = h.service.login("a@x.com", "p1").await.unwrap();

    assert_eq!(
        h.service.refresh_tokens(&tokens.access_token).await,
        Err(AuthError::Unauthorized)
    );
}

#[tokio::test]
async fn garbage_refresh_token_is_unauthorized() {
    let h = harness();
    assert_eq!(h.service.refresh_tokens("garbage").await, Err(AuthError::Unauthorized));
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;
    let tokens = h.service.login("a@x.com", "p1").await.unwrap();

    let claims = claims_of(&h, &tokens.access_token);
    h.service.logout(&claims).await.unwrap();
    h.service.logout(&claims).await.unwrap();

    assert_eq!(
        h.service.refresh_tokens(&tokens.refresh_token).await,
        Err(AuthError::Unauthorized)
    );
}

#[tokio::test]
async fn logout_of_foreign_session_is_unauthorized() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;
    let tokens = h.service.login("a@x.com", "p1").await.unwrap();
    let owner = claims_of(&h, &tokens.access_token);

    let forged = TokenClaims::new(
        UserId::new(),
        owner.session_id,
        TokenKind::Access,
        h.clock.now(),
        h.clock.now() + Duration::minutes(1),
    );
    assert_eq!(h.service.logout(&forged).await, Err(AuthError::Unauthorized));

    let unknown = TokenClaims::new(
        owner.user_id,
        SessionId::new(),
        TokenKind::Access,
        h.clock.now(),
        h.clock.now() + Duration::minutes(1),
    );
    assert_eq!(h.service.logout(&unknown).await, Err(AuthError::Unauthorized));

    assert!(h.service.refresh_tokens(&tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn expired_refresh_token_is_unauthorized() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;
    let tokens = h.service.login("a@x.com", "p1").await.unwrap();

    h.clock.advance(Duration::days(7));
    assert_eq!(
        h.service.refresh_tokens(&tokens.refresh_token).await,
        Err(AuthError::Unauthorized)
    );
}

#[tokio::test]
async fn refresh_extends_session_lifetime() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;
    let first = h.service.login("a@x.com", "p1").await.unwrap();

    h.clock.advance(Duration::days(6));
    let second = h.service.refresh_tokens(&first.refresh_token).await.unwrap();
    assert_eq!(second.refresh_expires_at, start() + Duration::days(13));

    h.clock.advance(Duration::days(2));
    assert!(h.service.refresh_tokens(&second.refresh_token).await.is_ok());
}

#[tokio::test]
async fn session_cap_evicts_oldest_session() {
    let h = harness_with(config().with_max_sessions_per_user(Some(2)));
    register(&h, "a@x.com", "p1").await;

    let oldest = h.service.login("a@x.com", "p1").await.unwrap();
    h.clock.advance(Duration::seconds(1));
    let middle = h.service.login("a@x.com", "p1").await.unwrap();
    h.clock.advance(Duration::seconds(1));
    let newest = h.service.login("a@x.com", "p1").await.unwrap();

    assert_eq!(
        h.service.refresh_tokens(&oldest.refresh_token).await,
        Err(AuthError::Unauthorized)
    );
    assert!(h.service.refresh_tokens(&middle.refresh_token).await.is_ok());
    assert!(h.service.refresh_tokens(&newest.refresh_token).await.is_ok());
}

#[tokio::test]
async fn unlimited_sessions_by_default() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;

    let mut all = Vec::new();
    for _ in 0..5 {
        all.push(h.service.login("a@x.com", "p1").await.unwrap());
    }
    for tokens in all {
        assert!(h.service.refresh_tokens(&tokens.refresh_token).await.is_ok());
    }
}

async fn billing_module(h: &Harness) {
    let manifest = ModuleManifest::new("billing")
        .permission("billing.view")
        .menu(MenuDefinition::new("dashboard", "Dashboard").path("/"))
        .menu(
            MenuDefinition::new("billing", "Billing")
                .parent("dashboard")
                .permission("billing.view")
                .path("/billing"),
        );
    h.service.register_module(manifest).await.unwrap();
}

#[tokio::test]
async fn menu_follows_role_permissions() {
    let h = harness();
    billing_module(&h).await;
    let user_id = register(&h, "a@x.com", "p1").await;

    let menu = h.service.get_my_menu(user_id).await.unwrap();
    assert_eq!(menu.len(), 1);
    assert_eq!(menu[0].label, "Dashboard");
    assert!(menu[0].children.is_empty());

    let role = h.service.create_role("accountant").await.unwrap();
    h.service.add_permission_to_role(role.id, "billing.view").await.unwrap();
    h.service.assign_role(user_id, role.id).await.unwrap();

    let menu = h.service.get_my_menu(user_id).await.unwrap();
    assert_eq!(menu.len(), 1);
    assert_eq!(menu[0].children.len(), 1);
    assert_eq!(menu[0].children[0].label, "Billing");
    assert_eq!(menu, h.service.get_my_menu(user_id).await.unwrap());
}

#[tokio::test]
async fn module_registration_is_idempotent() {
    let h = harness();
    h.service.register_module(auth_manifest()).await.unwrap();
    h.service.register_module(auth_manifest()).await.unwrap();

    let permissions = h.service.list_permissions().await.unwrap();
    let ids: Vec<_> = permissions.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["auth.roles.manage", "auth.users.read"]);
    assert!(permissions.iter().all(|p| p.module == "auth"));
    assert!(h.events.drain().is_empty());
}

#[tokio::test]
async fn registrations_from_the_bus_upsert_permissions_and_menus() {
    let bus = Arc::new(InMemoryEventBus::<EventEnvelope>::new());
    let registrations = bus.subscribe_to(&[
        subjects::SYSTEM_PERMISSIONS_REGISTER,
        subjects::SYSTEM_MENUS_REGISTER,
    ]);
    let service = AuthService::new(&config(), Arc::new(InMemoryCredentialStore::new()), bus.clone())
        .unwrap();

    let permissions = RegisterPermissions {
        module: "cms".to_string(),
        permissions: vec!["cms.pages.view".to_string()],
        occurred_at: start(),
    };
    let menus = RegisterMenus {
        domain: "cms".to_string(),
        version: 1,
        menu: vec![MenuDefinition::new("cms.pages", "Pages").permission("cms.pages.view")],
        occurred_at: start(),
    };
    // At-least-once: the same message twice must converge.
    for _ in 0..2 {
        bus.publish(EventEnvelope::from_event(&permissions).unwrap()).unwrap();
        bus.publish(EventEnvelope::from_event(&menus).unwrap()).unwrap();
    }
    let malformed = EventEnvelope::new(
        uuid::Uuid::now_v7(),
        subjects::SYSTEM_MENUS_REGISTER,
        1,
        start(),
        serde_json::json!({ "domain": "cms" }),
    );
    bus.publish(malformed).unwrap();

    assert_eq!(service.apply_registrations(registrations.drain()).await, 4);

    let ids: Vec<_> = service
        .list_permissions()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec!["cms.pages.view"]);

    let user_id = service
        .register(NewUser::new("a@x.com", "p1", "A"))
        .await
        .unwrap()
        .id;
    assert!(service.get_my_menu(user_id).await.unwrap().is_empty());

    let editor = service.create_role("editor").await.unwrap();
    service.add_permission_to_role(editor.id, "cms.pages.view").await.unwrap();
    service.assign_role(user_id, editor.id).await.unwrap();
    let menu = service.get_my_menu(user_id).await.unwrap();
    assert_eq!(menu.len(), 1);
    assert_eq!(menu[0].label, "Pages");
}

#[tokio::test]
async fn unrelated_envelopes_are_not_registrations() {
    let h = harness();
    register(&h, "a@x.com", "p1").await;
    let user_registered = h.events.drain();
    assert_eq!(h.service.apply_registrations(user_registered).await, 0);
}

#[tokio::test]
async fn module_registration_rejects_bad_input() {
    let h = harness();
    let empty_module = ModuleManifest::new("").permission("x.view");
    assert!(matches!(
        h.service.register_module(empty_module).await,
        Err(AuthError::Validation(_))
    ));

    let duplicate_menu = vec![MenuDefinition::new("a", "A"), MenuDefinition::new("a", "B")];
    assert!(matches!(
        h.service.register_module_menus("cms", duplicate_menu).await,
        Err(AuthError::Validation(_))
    ));

    let blank_permission = vec!["cms.view".to_string(), " ".to_string()];
    assert!(matches!(
        h.service.register_module_permissions("cms", &blank_permission).await,
        Err(AuthError::Validation(_))
    ));
    assert!(h.service.list_permissions().await.unwrap().is_empty());
}

#[tokio::test]
async fn authorize_requires_permission_or_wildcard() {
    let h = harness();
    h.service
        .register_module_permissions("system", &["*".to_string(), "billing.view".to_string()])
        .await
        .unwrap();
    let user_id = register(&h, "a@x.com", "p1").await;

    assert_eq!(
        h.service.authorize(user_id, "billing.view").await,
        Err(AuthError::Forbidden("billing.view".to_string()))
    );

    let admin = h.service.create_role("admin").await.unwrap();
    h.service.add_permission_to_role(admin.id, "*").await.unwrap();
    h.service.assign_role(user_id, admin.id).await.unwrap();

    assert_eq!(h.service.authorize(user_id, "billing.view").await, Ok(()));
    assert_eq!(h.service.authorize(user_id, "never.registered").await, Ok(()));
    assert!(h.service.user_permissions(user_id).await.unwrap().has_wildcard());
}

#[tokio::test]
async fn role_management_errors() {
    let h = harness();
    h.service.create_role("editor").await.unwrap();
    assert!(matches!(
        h.service.create_role("editor").await,
        Err(AuthError::AlreadyExists(_))
    ));
    assert!(matches!(h.service.create_role("  ").await, Err(AuthError::Validation(_))));

    let role = h.service.get_roles().await.unwrap().remove(0);
    assert_eq!(
        h.service.assign_role(UserId::new(), role.id).await,
        Err(AuthError::NotFound)
    );
    assert_eq!(
        h.service.add_permission_to_role(role.id, "unknown.perm").await,
        Err(AuthError::NotFound)
    );
}
