use uuid::Uuid;

use super::{into_result, trim_optional, trim_required, validate};
use crate::{
    audit::AuditRecorder,
    cache::ResponseCache,
    error::{AppError, AppResult},
    models::{
        AuditAction, CreatePageElementRequest, CreatePageRequest, Page, PageElement, PageResponse,
        UpdatePageElementRequest, UpdatePageRequest,
    },
    permissions::Resource,
    repository::{
        NewPage, NewPageElement, PageElementPatch, PagePatch, RepoError, RepositoryState,
    },
};

/// PageService
///
/// Pages and the page elements they own. Element changes also drop cached menus,
/// since menu responses embed element summaries.
#[derive(Clone)]
pub struct PageService {
    repo: RepositoryState,
    audit: AuditRecorder,
    cache: ResponseCache,
}

impl PageService {
    pub fn new(repo: RepositoryState, audit: AuditRecorder, cache: ResponseCache) -> Self {
        Self { repo, audit, cache }
    }

    async fn load(&self, id: Uuid) -> AppResult<Page> {
        self.repo
            .get_page(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Page not found".into()))
    }

    /// Loads an element and checks that it belongs to `page_id`.
    async fn load_element(&self, page_id: Uuid, element_id: Uuid) -> AppResult<PageElement> {
        match self.repo.get_page_element(element_id).await? {
            Some(element) if element.page_id == page_id => Ok(element),
            _ => Err(AppError::NotFound("Page element not found".into())),
        }
    }

    async fn check_unique_name(&self, name: &str, except: Option<Uuid>) -> AppResult<()> {
        match self.repo.find_page_by_name(name).await? {
            Some(existing) if Some(existing.id) != except => Err(AppError::Conflict(
                "A page with this name already exists".into(),
            )),
            _ => Ok(()),
        }
    }

    async fn check_unique_element_name(&self, name: &str, except: Option<Uuid>) -> AppResult<()> {
        match self.repo.find_page_element_by_name(name).await? {
            Some(existing) if Some(existing.id) != except => Err(AppError::Conflict(
                "A page element with this name already exists".into(),
            )),
            _ => Ok(()),
        }
    }

    fn pages_changed(&self) {
        self.cache.invalidate(Resource::Pages);
    }

    fn elements_changed(&self) {
        self.cache.invalidate(Resource::Pages);
        self.cache.invalidate(Resource::Menus);
    }

    // --- Pages ---

    pub async fn list(&self) -> AppResult<Vec<PageResponse>> {
        let pages = self.repo.list_pages().await?;
        let mut out = Vec::with_capacity(pages.len());
        for page in pages {
            let elements = self.repo.list_page_elements(page.id).await?;
            out.push(PageResponse::new(page, elements));
        }
        Ok(out)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<PageResponse> {
        let page = self.load(id).await?;
        let elements = self.repo.list_page_elements(id).await?;
        Ok(PageResponse::new(page, elements))
    }

    pub async fn create(&self, actor: Option<Uuid>, mut input: CreatePageRequest) -> AppResult<Page> {
        let mut errors = Vec::new();
        trim_required(&mut input.name, "name", &mut errors);
        into_result(errors)?;
        validate(&input)?;

        self.check_unique_name(&input.name, None).await?;

        let page = self
            .repo
            .create_page(NewPage {
                name: input.name,
                description: input.description,
                display_order: input.display_order,
            })
            .await?;

        self.audit.record(
            actor,
            AuditAction::Create,
            Resource::Pages,
            format!("Page {} was created", page.name),
        );
        self.pages_changed();
        Ok(page)
    }

    pub async fn update(
        &self,
        actor: Option<Uuid>,
        id: Uuid,
        mut input: UpdatePageRequest,
    ) -> AppResult<Page> {
        let mut errors = Vec::new();
        trim_optional(&mut input.name, "name", &mut errors);
        into_result(errors)?;
        validate(&input)?;

        self.load(id).await?;
        if let Some(name) = &input.name {
            self.check_unique_name(name, Some(id)).await?;
        }

        let page = self
            .repo
            .update_page(
                id,
                PagePatch {
                    name: input.name,
                    description: input.description,
                    display_order: input.display_order,
                },
            )
            .await?;

        self.audit.record(
            actor,
            AuditAction::Update,
            Resource::Pages,
            format!("Page {} was updated", page.name),
        );
        self.pages_changed();
        Ok(page)
    }

    /// delete
    ///
    /// Refused with `HasDependents` while the page still owns elements. The check
    /// and the delete are separate steps, so a concurrent element insert can slip in
    /// between them.
    pub async fn delete(&self, actor: Option<Uuid>, id: Uuid) -> AppResult<()> {
        let page = self.load(id).await?;
        if self.repo.count_page_elements(id).await? > 0 {
            return Err(AppError::HasDependents(
                "Cannot delete page with existing elements. Delete the elements first.".into(),
            ));
        }

        self.repo.delete_page(id).await?;
        self.audit.record(
            actor,
            AuditAction::Delete,
            Resource::Pages,
            format!("Page {} was deleted", page.name),
        );
        self.pages_changed();
        Ok(())
    }

    /// reorder
    ///
    /// Sets each listed page's `displayOrder` to its index. Each write is independent:
    /// unknown ids are skipped and a failed write is logged without stopping the rest.
    /// Returns how many pages were updated.
    pub async fn reorder(&self, actor: Option<Uuid>, ids: &[Uuid]) -> AppResult<u32> {
        let mut updated = 0;
        for (index, id) in ids.iter().enumerate() {
            let patch = PagePatch {
                display_order: Some(index as i32),
                ..Default::default()
            };
            match self.repo.update_page(*id, patch).await {
                Ok(_) => updated += 1,
                Err(RepoError::NotFound(_)) => {
                    tracing::debug!(page_id = %id, "reorder skipped unknown page");
                }
                Err(e) => {
                    tracing::error!(page_id = %id, "reorder failed to update page: {}", e);
                }
            }
        }

        self.audit.record(
            actor,
            AuditAction::Reorder,
            Resource::Pages,
            format!("Pages reordered ({} updated)", updated),
        );
        self.pages_changed();
        Ok(updated)
    }

    // --- Page Elements ---

    pub async fn elements(&self, page_id: Uuid) -> AppResult<Vec<PageElement>> {
        self.load(page_id).await?;
        Ok(self.repo.list_page_elements(page_id).await?)
    }

    pub async fn create_element(
        &self,
        actor: Option<Uuid>,
        page_id: Uuid,
        mut input: CreatePageElementRequest,
    ) -> AppResult<PageElement> {
        let mut errors = Vec::new();
        trim_required(&mut input.name, "name", &mut errors);
        into_result(errors)?;
        validate(&input)?;

        let page = self.load(page_id).await?;
        self.check_unique_element_name(&input.name, None).await?;

        let element = self
            .repo
            .create_page_element(NewPageElement {
                name: input.name,
                description: input.description,
                is_root: input.is_root.unwrap_or(true),
                display_order: input.display_order,
                page_id: page.id,
            })
            .await?;

        self.audit.record(
            actor,
            AuditAction::Create,
            Resource::Pages,
            format!("Page element {} was created on page {}", element.name, page.name),
        );
        self.elements_changed();
        Ok(element)
    }

    pub async fn update_element(
        &self,
        actor: Option<Uuid>,
        page_id: Uuid,
        element_id: Uuid,
        mut input: UpdatePageElementRequest,
    ) -> AppResult<PageElement> {
        let mut errors = Vec::new();
        trim_optional(&mut input.name, "name", &mut errors);
        into_result(errors)?;
        validate(&input)?;

        self.load_element(page_id, element_id).await?;
        if let Some(name) = &input.name {
            self.check_unique_element_name(name, Some(element_id)).await?;
        }
        if let Some(target) = input.page {
            if self.repo.get_page(target).await?.is_none() {
                return Err(AppError::invalid("page", "Page not found"));
            }
        }

        let element = self
            .repo
            .update_page_element(
                element_id,
                PageElementPatch {
                    name: input.name,
                    description: input.description,
                    is_root: input.is_root,
                    display_order: input.display_order,
                    page_id: input.page,
                },
            )
            .await?;

        self.audit.record(
            actor,
            AuditAction::Update,
            Resource::Pages,
            format!("Page element {} was updated", element.name),
        );
        self.elements_changed();
        Ok(element)
    }

    pub async fn delete_element(
        &self,
        actor: Option<Uuid>,
        page_id: Uuid,
        element_id: Uuid,
    ) -> AppResult<()> {
        self.load_element(page_id, element_id).await?;
        let element = self.repo.delete_page_element(element_id).await?;

        self.audit.record(
            actor,
            AuditAction::Delete,
            Resource::Pages,
            format!("Page element {} was deleted", element.name),
        );
        self.elements_changed();
        Ok(())
    }

    /// bulk_delete_elements
    ///
    /// Deletes each listed element of `page_id` on its own. Ids that are unknown or
    /// belong to another page are ignored. Returns how many were deleted.
    pub async fn bulk_delete_elements(
        &self,
        actor: Option<Uuid>,
        page_id: Uuid,
        ids: &[Uuid],
    ) -> AppResult<u32> {
        let page = self.load(page_id).await?;

        let mut deleted = 0;
        for id in ids {
            let owned = self
                .repo
                .get_page_element(*id)
                .await?
                .is_some_and(|e| e.page_id == page_id);
            if !owned {
                continue;
            }
            match self.repo.delete_page_element(*id).await {
                Ok(_) => deleted += 1,
                Err(RepoError::NotFound(_)) => {}
                Err(e) => tracing::error!(element_id = %id, "bulk delete failed for element: {}", e),
            }
        }

        self.audit.record(
            actor,
            AuditAction::BulkDelete,
            Resource::Pages,
            format!("{} elements deleted from page {}", deleted, page.name),
        );
        self.elements_changed();
        Ok(deleted)
    }
}
