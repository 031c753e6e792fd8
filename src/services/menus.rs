use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{into_result, is_valid_slug, trim_optional, trim_required, validate};
use crate::{
    audit::AuditRecorder,
    cache::ResponseCache,
    error::{AppError, AppResult, FieldError},
    models::{AuditAction, CreateMenuRequest, Menu, MenuResponse, PageElement, UpdateMenuRequest},
    permissions::Resource,
    repository::{MenuPatch, NewMenu, RepoError, RepositoryState},
};

const SLUG_RULE: &str =
    "Slug may only contain lowercase letters, digits, '-' and '/' separators";

/// MenuService
///
/// Navigation menus. A menu may hang under a parent menu and always points at a
/// page element; both relations are resolved in every response.
#[derive(Clone)]
pub struct MenuService {
    repo: RepositoryState,
    audit: AuditRecorder,
    cache: ResponseCache,
}

impl MenuService {
    pub fn new(repo: RepositoryState, audit: AuditRecorder, cache: ResponseCache) -> Self {
        Self { repo, audit, cache }
    }

    async fn load(&self, id: Uuid) -> AppResult<Menu> {
        self.repo
            .get_menu(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Menu not found".into()))
    }

    async fn respond(&self, menu: Menu) -> AppResult<MenuResponse> {
        let parent = match menu.parent_id {
            Some(parent_id) => self.repo.get_menu(parent_id).await?,
            None => None,
        };
        let element = self.repo.get_page_element(menu.page_element_id).await?;
        Ok(MenuResponse::new(menu, parent.as_ref(), element.as_ref()))
    }

    async fn check_unique_name(&self, name: &str, except: Option<Uuid>) -> AppResult<()> {
        match self.repo.find_menu_by_name(name).await? {
            Some(existing) if Some(existing.id) != except => Err(AppError::Conflict(
                "A menu with this name already exists".into(),
            )),
            _ => Ok(()),
        }
    }

    async fn check_page_element(&self, id: Uuid, errors: &mut Vec<FieldError>) -> AppResult<()> {
        if self.repo.get_page_element(id).await?.is_none() {
            errors.push(FieldError::new("pageElement", "Page element not found"));
        }
        Ok(())
    }

    /// check_parent
    ///
    /// The parent must exist, and for an existing menu (`menu_id`) it must be neither
    /// the menu itself nor one of its descendants.
    async fn check_parent(
        &self,
        menu_id: Option<Uuid>,
        parent_id: Uuid,
        errors: &mut Vec<FieldError>,
    ) -> AppResult<()> {
        if menu_id == Some(parent_id) {
            errors.push(FieldError::new("parent", "A menu cannot be its own parent"));
            return Ok(());
        }
        let Some(parent) = self.repo.get_menu(parent_id).await? else {
            errors.push(FieldError::new("parent", "Parent menu not found"));
            return Ok(());
        };
        let Some(menu_id) = menu_id else {
            return Ok(());
        };

        let mut seen = HashSet::from([parent.id]);
        let mut cursor = parent.parent_id;
        while let Some(ancestor_id) = cursor {
            if ancestor_id == menu_id {
                errors.push(FieldError::new(
                    "parent",
                    "Parent would create a cycle in the menu tree",
                ));
                break;
            }
            if !seen.insert(ancestor_id) {
                break;
            }
            cursor = self
                .repo
                .get_menu(ancestor_id)
                .await?
                .and_then(|m| m.parent_id);
        }
        Ok(())
    }

    fn menus_changed(&self) {
        self.cache.invalidate(Resource::Menus);
    }

    pub async fn list(&self) -> AppResult<Vec<MenuResponse>> {
        let menus = self.repo.list_menus().await?;
        let by_id: HashMap<Uuid, Menu> = menus.iter().map(|m| (m.id, m.clone())).collect();

        let mut elements: HashMap<Uuid, Option<PageElement>> = HashMap::new();
        for menu in &menus {
            if !elements.contains_key(&menu.page_element_id) {
                let element = self.repo.get_page_element(menu.page_element_id).await?;
                elements.insert(menu.page_element_id, element);
            }
        }

        Ok(menus
            .into_iter()
            .map(|menu| {
                let parent = menu.parent_id.and_then(|id| by_id.get(&id));
                let element = elements.get(&menu.page_element_id).and_then(Option::as_ref);
                MenuResponse::new(menu, parent, element)
            })
            .collect())
    }

    pub async fn get(&self, id: Uuid) -> AppResult<MenuResponse> {
        let menu = self.load(id).await?;
        self.respond(menu).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> AppResult<MenuResponse> {
        let menu = self
            .repo
            .find_menu_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound("Menu not found".into()))?;
        self.respond(menu).await
    }

    pub async fn create(
        &self,
        actor: Option<Uuid>,
        mut input: CreateMenuRequest,
    ) -> AppResult<MenuResponse> {
        let mut errors = Vec::new();
        trim_required(&mut input.name, "name", &mut errors);
        trim_required(&mut input.label, "label", &mut errors);
        trim_required(&mut input.icon, "icon", &mut errors);
        trim_required(&mut input.slug, "slug", &mut errors);
        into_result(errors)?;
        validate(&input)?;

        let mut errors = Vec::new();
        if !is_valid_slug(&input.slug) {
            errors.push(FieldError::new("slug", SLUG_RULE));
        }
        if let Some(parent_id) = input.parent {
            self.check_parent(None, parent_id, &mut errors).await?;
        }
        self.check_page_element(input.page_element, &mut errors).await?;
        into_result(errors)?;

        self.check_unique_name(&input.name, None).await?;

        let menu = self
            .repo
            .create_menu(NewMenu {
                name: input.name,
                label: input.label,
                icon: input.icon,
                slug: input.slug,
                display_order: input.display_order,
                parent_id: input.parent,
                page_element_id: input.page_element,
            })
            .await?;

        self.audit.record(
            actor,
            AuditAction::Create,
            Resource::Menus,
            format!("Menu {} was created", menu.name),
        );
        self.menus_changed();
        self.respond(menu).await
    }

    pub async fn update(
        &self,
        actor: Option<Uuid>,
        id: Uuid,
        mut input: UpdateMenuRequest,
    ) -> AppResult<MenuResponse> {
        let mut errors = Vec::new();
        trim_optional(&mut input.name, "name", &mut errors);
        trim_optional(&mut input.label, "label", &mut errors);
        trim_optional(&mut input.icon, "icon", &mut errors);
        trim_optional(&mut input.slug, "slug", &mut errors);
        into_result(errors)?;
        validate(&input)?;

        self.load(id).await?;

        let mut errors = Vec::new();
        if let Some(slug) = &input.slug {
            if !is_valid_slug(slug) {
                errors.push(FieldError::new("slug", SLUG_RULE));
            }
        }
        if let Some(Some(parent_id)) = input.parent {
            self.check_parent(Some(id), parent_id, &mut errors).await?;
        }
        if let Some(element_id) = input.page_element {
            self.check_page_element(element_id, &mut errors).await?;
        }
        into_result(errors)?;

        if let Some(name) = &input.name {
            self.check_unique_name(name, Some(id)).await?;
        }

        let menu = self
            .repo
            .update_menu(
                id,
                MenuPatch {
                    name: input.name,
                    label: input.label,
                    icon: input.icon,
                    slug: input.slug,
                    display_order: input.display_order,
                    parent_id: input.parent,
                    page_element_id: input.page_element,
                },
            )
            .await?;

        self.audit.record(
            actor,
            AuditAction::Update,
            Resource::Menus,
            format!("Menu {} was updated", menu.name),
        );
        self.menus_changed();
        self.respond(menu).await
    }

    /// delete
    ///
    /// Refused with `HasDependents` while other menus hang under this one.
    pub async fn delete(&self, actor: Option<Uuid>, id: Uuid) -> AppResult<()> {
        let menu = self.load(id).await?;
        if self.repo.count_child_menus(id).await? > 0 {
            return Err(AppError::HasDependents(
                "Cannot delete menu with submenus. Delete submenus first.".into(),
            ));
        }

        self.repo.delete_menu(id).await?;
        self.audit.record(
            actor,
            AuditAction::Delete,
            Resource::Menus,
            format!("Menu {} was deleted", menu.name),
        );
        self.menus_changed();
        Ok(())
    }

    /// Same contract as page reordering: index becomes `displayOrder`, unknown ids
    /// are skipped, writes are independent.
    pub async fn reorder(&self, actor: Option<Uuid>, ids: &[Uuid]) -> AppResult<u32> {
        let mut updated = 0;
        for (index, id) in ids.iter().enumerate() {
            let patch = MenuPatch {
                display_order: Some(index as i32),
                ..Default::default()
            };
            match self.repo.update_menu(*id, patch).await {
                Ok(_) => updated += 1,
                Err(RepoError::NotFound(_)) => {
                    tracing::debug!(menu_id = %id, "reorder skipped unknown menu");
                }
                Err(e) => {
                    tracing::error!(menu_id = %id, "reorder failed to update menu: {}", e);
                }
            }
        }

        self.audit.record(
            actor,
            AuditAction::Reorder,
            Resource::Menus,
            format!("Menus reordered ({} updated)", updated),
        );
        self.menus_changed();
        Ok(updated)
    }
}
