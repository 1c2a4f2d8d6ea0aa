//! Change classification
//!
//! One raw mutation becomes at most one typed [`ChangeEvent`]. Puts are
//! never trusted to carry the entity: the affected entity is re-read through
//! the same decoders the assembler uses, so the event always reflects the
//! latest committed state.

use super::Engine;
use crate::domain::{
    BackendKey, ChangeEvent, FrontendKey, HostKey, ListenerKey, MiddlewareKey, ServerKey,
};
use crate::errors::{Error, Result};
use crate::keys::{Family, KeyMatch};
use crate::store::{Mutation, MutationKind};

impl Engine {
    /// Classify one mutation.
    ///
    /// Keys outside the grammar yield `Ok(None)`. A put whose entity is gone
    /// by the time it is re-read fails with [`Error::NotFound`]; the watch
    /// loop applies the configured vanished policy to it.
    pub async fn classify(&self, mutation: &Mutation) -> Result<Option<ChangeEvent>> {
        let Some(matched) = self.layout.match_key(&mutation.key) else {
            return Ok(None);
        };

        let event = match mutation.kind {
            MutationKind::Put => self.upserted(&matched).await?,
            MutationKind::Delete => self.deleted_event(&matched)?,
            MutationKind::Expire => match matched.family {
                Family::Frontend | Family::Middleware | Family::Server => {
                    self.deleted_event(&matched)?
                }
                family => {
                    return Err(Error::unsupported_action(
                        mutation.kind.to_string(),
                        family.resource_type(),
                        mutation.key.clone(),
                    ))
                }
            },
        };
        Ok(Some(event))
    }

    async fn upserted(&self, matched: &KeyMatch) -> Result<ChangeEvent> {
        let event = match matched.family {
            Family::Host => {
                ChangeEvent::HostUpserted { host: self.host(&HostKey::new(&matched.id)).await? }
            }
            Family::Listener => ChangeEvent::ListenerUpserted {
                listener: self.listener(&ListenerKey::new(&matched.id)).await?,
            },
            Family::Frontend => ChangeEvent::FrontendUpserted {
                frontend: self.resolve_frontend_spec(&matched.id).await?,
            },
            Family::Middleware => {
                let key = MiddlewareKey::new(parent_of(matched)?, &matched.id);
                let middleware = self.middleware(&key).await?;
                ChangeEvent::MiddlewareUpserted { frontend_key: key.frontend_key, middleware }
            }
            Family::Backend => ChangeEvent::BackendUpserted {
                backend: self.resolve_backend_spec(&matched.id).await?,
            },
            Family::Server => {
                let key = ServerKey::new(parent_of(matched)?, &matched.id);
                let server = self.server(&key).await?;
                ChangeEvent::ServerUpserted { backend_key: key.backend_key, server }
            }
        };
        Ok(event)
    }

    /// `Deleted` event for a matched key; nothing is read.
    pub(crate) fn deleted_event(&self, matched: &KeyMatch) -> Result<ChangeEvent> {
        let id = matched.id.clone();
        let event = match matched.family {
            Family::Host => ChangeEvent::HostDeleted { key: HostKey::new(id) },
            Family::Listener => ChangeEvent::ListenerDeleted { key: ListenerKey::new(id) },
            Family::Frontend => ChangeEvent::FrontendDeleted { key: FrontendKey::new(id) },
            Family::Middleware => {
                ChangeEvent::MiddlewareDeleted { key: MiddlewareKey::new(parent_of(matched)?, id) }
            }
            Family::Backend => ChangeEvent::BackendDeleted { key: BackendKey::new(id) },
            Family::Server => {
                ChangeEvent::ServerDeleted { key: ServerKey::new(parent_of(matched)?, id) }
            }
        };
        Ok(event)
    }
}

fn parent_of(matched: &KeyMatch) -> Result<&str> {
    matched.parent_id.as_deref().ok_or_else(|| {
        Error::internal(format!("{} '{}' matched without a parent id", matched.family, matched.id))
    })
}
