//! Worklist resolution of a directory's secret
//!
//! Each frame on the stack is one directory whose secret we want. For a
//! frame we try, in order:
//!
//! 1. Any wrapped entry whose wrapping key is already in the key cache
//! 2. The superseded-by block: recover the superseding directory's secret
//!    and unwrap the old secret from it
//! 3. Group principal entries, groups we believe we belong to first:
//!    recover the group's private key from its private key directory and
//!    unwrap the entry with it
//!
//! Steps 2 and 3 push a frame for another directory. When that frame
//! resolves, its result finishes the route in the frame below. A visited
//! set and a depth bound keep the walk finite. Failures of a single
//! candidate are logged and the next candidate is tried.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use super::{DirectoryIndex, KeyDirectory, KeyDirectoryError};
use crate::access::context::KeyContext;
use crate::access::profile::{PrincipalInfo, PRIVATE_KEY_MARKER, SUPERSEDED_MARKER};
use crate::crypto::{Key, Secret, WrappedKey};
use crate::name::Name;

/// What a frame's directory secret is needed for
#[derive(Debug, Clone)]
enum Goal {
    /// The secret itself
    Secret,
    /// The group private key stored under the secret
    GroupPrivateKey(PrincipalInfo),
}

#[derive(Debug)]
enum Route {
    Superseded {
        wrapped: WrappedKey,
        directory: Name,
    },
    Group {
        principal: PrincipalInfo,
        wrapped: WrappedKey,
        directory: Name,
    },
}

impl Route {
    fn wrapped(&self) -> &WrappedKey {
        match self {
            Route::Superseded { wrapped, .. } | Route::Group { wrapped, .. } => wrapped,
        }
    }

    fn directory(&self) -> &Name {
        match self {
            Route::Superseded { directory, .. } | Route::Group { directory, .. } => directory,
        }
    }

    /// What the directory at the end of this route must yield
    fn goal(&self) -> Goal {
        match self {
            Route::Superseded { .. } => Goal::Secret,
            Route::Group { principal, .. } => Goal::GroupPrivateKey(principal.clone()),
        }
    }

    /// Unwrap this route's entry with the key found at its end
    fn complete(&self, key: &Key) -> Option<Secret> {
        match self.wrapped().unwrap(key) {
            Ok(Key::Symmetric(secret)) => Some(secret),
            Ok(Key::Private(_)) => {
                tracing::debug!("entry via {} holds a private key", self.directory());
                None
            }
            Err(e) => {
                tracing::debug!("unwrap via {} failed: {}", self.directory(), e);
                None
            }
        }
    }
}

struct Frame {
    /// `None` for the directory resolution started from
    directory: Option<KeyDirectory>,
    goal: Goal,
    routes: VecDeque<Route>,
    /// The route waiting on the frame above
    pending: Option<Route>,
}

enum Opened {
    /// The directory's output, found without descending
    Found(Key),
    Routes(VecDeque<Route>),
}

enum Step {
    /// The frame's output
    Resolved(Key),
    Exhausted,
    Descend(Frame),
    Continue,
}

/// Recover `root`'s secret, or `None` if no route leads to it
pub(super) async fn resolve(root: &KeyDirectory) -> Result<Option<Secret>, KeyDirectoryError> {
    let context = root.context.clone();
    let root_name = root.versioned_name().await?.clone();
    let mut visited = BTreeSet::from([root_name]);

    let routes = match open(&context, root, &Goal::Secret).await? {
        Opened::Found(key) => return Ok(key.into_secret()),
        Opened::Routes(routes) => routes,
    };
    let mut stack = vec![Frame {
        directory: None,
        goal: Goal::Secret,
        routes,
        pending: None,
    }];
    let mut child_result: Option<Option<Key>> = None;

    while let Some(frame) = stack.last_mut() {
        let directory = frame.directory.as_ref().unwrap_or(root);

        let step = if let Some(result) = child_result.take() {
            match (frame.pending.take(), result) {
                (Some(route), Some(key)) => match route.complete(&key) {
                    Some(secret) => finish(&context, directory, &frame.goal, secret)
                        .await
                        .map_or(Step::Continue, Step::Resolved),
                    None => Step::Continue,
                },
                _ => Step::Continue,
            }
        } else {
            match frame.routes.pop_front() {
                None => Step::Exhausted,
                Some(route) => match follow(&context, route, &mut visited).await {
                    Followed::Unwrapped(secret) => {
                        finish(&context, directory, &frame.goal, secret)
                            .await
                            .map_or(Step::Continue, Step::Resolved)
                    }
                    Followed::Descend(child, route) => {
                        frame.pending = Some(route);
                        Step::Descend(child)
                    }
                    Followed::Failed => Step::Continue,
                },
            }
        };

        match step {
            Step::Resolved(key) => {
                stack.pop();
                if stack.is_empty() {
                    return Ok(key.into_secret());
                }
                child_result = Some(Some(key));
            }
            Step::Exhausted => {
                stack.pop();
                if stack.is_empty() {
                    tracing::debug!("no route to the key in {}", root.name());
                    return Ok(None);
                }
                child_result = Some(None);
            }
            Step::Descend(child) => stack.push(child),
            Step::Continue => {}
        }
    }
    Ok(None)
}

enum Followed {
    Unwrapped(Secret),
    Descend(Frame, Route),
    Failed,
}

/// Take one route out of a directory
async fn follow(
    context: &Arc<KeyContext>,
    route: Route,
    visited: &mut BTreeSet<Name>,
) -> Followed {
    // The key at the end of the route may already be known
    if let Some(key) = context.cache().get(&route.wrapped().wrapping_key_id()) {
        if let Some(secret) = route.complete(&key) {
            return Followed::Unwrapped(secret);
        }
    }

    let target = route.directory().clone();
    if visited.contains(&target) {
        tracing::debug!("already visited {}, skipping", target);
        return Followed::Failed;
    }
    if visited.len() >= context.config().max_resolution_depth {
        tracing::debug!("resolution depth reached before {}", target);
        return Followed::Failed;
    }
    visited.insert(target.clone());

    let child = KeyDirectory::new(context.clone(), target.clone());
    let goal = route.goal();
    match open(context, &child, &goal).await {
        Ok(Opened::Found(key)) => match route.complete(&key) {
            Some(secret) => Followed::Unwrapped(secret),
            None => Followed::Failed,
        },
        Ok(Opened::Routes(routes)) => Followed::Descend(
            Frame {
                directory: Some(child),
                goal,
                routes,
                pending: None,
            },
            route,
        ),
        Err(e) => {
            tracing::debug!("could not open {}: {}", target, e);
            Followed::Failed
        }
    }
}

/// Try a directory without descending, else list its routes
async fn open(
    context: &Arc<KeyContext>,
    directory: &KeyDirectory,
    goal: &Goal,
) -> Result<Opened, KeyDirectoryError> {
    let name = directory.versioned_name().await?.clone();
    if let Some(secret) = context.cache().get_by_name(&name).and_then(Key::into_secret) {
        if let Some(key) = finish(context, directory, goal, secret).await {
            return Ok(Opened::Found(key));
        }
    }

    let index = directory.refresh().await?;
    for digest in index.wrapping_key_ids() {
        let Some(key) = context.cache().get(digest) else {
            continue;
        };
        let wrapped = match directory.wrapped_key_in(&index, digest).await {
            Ok(Some(wrapped)) => wrapped,
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!("fetching entry for {} in {} failed: {}", digest, name, e);
                continue;
            }
        };
        match wrapped.unwrap(&key) {
            Ok(Key::Symmetric(secret)) => {
                if let Some(key) = finish(context, directory, goal, secret).await {
                    return Ok(Opened::Found(key));
                }
            }
            Ok(Key::Private(_)) => {
                tracing::debug!("entry for {} in {} holds a private key", digest, name)
            }
            Err(e) => tracing::debug!("unwrap of entry for {} in {} failed: {}", digest, name, e),
        }
    }

    Ok(Opened::Routes(routes(context, directory, &index).await))
}

async fn routes(
    context: &Arc<KeyContext>,
    directory: &KeyDirectory,
    index: &DirectoryIndex,
) -> VecDeque<Route> {
    let mut routes = VecDeque::new();

    if index.has_superseded_block() {
        match directory.fetch_marker(SUPERSEDED_MARKER).await {
            Ok(Some(wrapped)) => match wrapped.wrapping_key_name().cloned() {
                Some(superseding) => routes.push_back(Route::Superseded {
                    wrapped,
                    directory: superseding,
                }),
                None => tracing::debug!(
                    "superseded block in {} does not name its successor",
                    directory.name()
                ),
            },
            Ok(None) => {}
            Err(e) => tracing::debug!(
                "fetching superseded block of {} failed: {}",
                directory.name(),
                e
            ),
        }
    }

    // Group principals only open the current generation
    if !routes.is_empty() {
        return routes;
    }

    let (known, unknown): (Vec<_>, Vec<_>) = index
        .principals()
        .filter(|principal| principal.is_group)
        .partition(|principal| context.is_known_member(&principal.friendly_name));
    for principal in known.into_iter().chain(unknown) {
        let wrapped = match directory.wrapped_key_for_principal_in(index, principal).await {
            Ok(Some(wrapped)) => wrapped,
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!(
                    "fetching entry for {} in {} failed: {}",
                    principal,
                    directory.name(),
                    e
                );
                continue;
            }
        };
        routes.push_back(Route::Group {
            principal: principal.clone(),
            wrapped,
            directory: context
                .profile()
                .group_private_key_directory(&principal.friendly_name, principal.version),
        });
    }
    routes
}

/// Cache a directory's secret and produce what its goal asks for
async fn finish(
    context: &Arc<KeyContext>,
    directory: &KeyDirectory,
    goal: &Goal,
    secret: Secret,
) -> Option<Key> {
    let name = directory.name().clone();
    context
        .cache()
        .put(Some(&name), Key::Symmetric(secret.clone()));

    let Goal::GroupPrivateKey(principal) = goal else {
        return Some(Key::Symmetric(secret));
    };

    let block = match directory.fetch_marker(PRIVATE_KEY_MARKER).await {
        Ok(Some(block)) => block,
        Ok(None) => {
            tracing::debug!("{} has no private key block", name);
            return None;
        }
        Err(e) => {
            tracing::debug!("fetching private key block of {} failed: {}", name, e);
            return None;
        }
    };
    match block.unwrap(&Key::Symmetric(secret)) {
        Ok(Key::Private(private)) => {
            context.cache().put(None, Key::Private(private.clone()));
            context.record_membership(&principal.friendly_name);
            tracing::debug!("recovered private key of {}", principal);
            Some(Key::Private(private))
        }
        Ok(Key::Symmetric(_)) => {
            tracing::debug!("private key block of {} holds a symmetric key", name);
            None
        }
        Err(e) => {
            tracing::debug!("unwrap of private key block of {} failed: {}", name, e);
            None
        }
    }
}
