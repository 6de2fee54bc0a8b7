//! Tag creation and listing: lightweight tags are plain refs under
//! `refs/tags/`; annotated tags store a Tag object and point the ref at
//! it.

use tracing::debug;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{
        object::{
            signature::{Signature, SignatureType},
            tag::Tag,
        },
        refs::RefExpectation,
    },
    repo::Repository,
};

impl Repository {
    /// Create a lightweight tag: a ref pointing straight at the commit.
    pub fn create_lightweight_tag(
        &self,
        name: &str,
        revision: &str,
    ) -> Result<ObjectHash, GitError> {
        let target = self.resolve_commit(revision)?;
        self.refs
            .update(&format!("refs/tags/{name}"), &target, RefExpectation::Absent)?;
        Ok(target)
    }

    /// Create an annotated tag object and its ref; returns the tag
    /// object's id.
    pub fn create_annotated_tag(
        &self,
        name: &str,
        revision: &str,
        message: &str,
        tagger: Option<Signature>,
    ) -> Result<ObjectHash, GitError> {
        let target = self.resolve_commit(revision)?;
        let target_type = self.storage.get_object_type(&target)?;
        let tagger =
            tagger.unwrap_or_else(|| self.default_signature(SignatureType::Tagger));

        let tag = Tag::new(
            target,
            target_type,
            name.to_string(),
            tagger,
            &format!("\n{message}"),
        )?;
        self.storage.save(&tag)?;
        self.refs
            .update(&format!("refs/tags/{name}"), &tag.id, RefExpectation::Absent)?;
        debug!(name, id = %tag.id, "annotated tag created");
        Ok(tag.id)
    }

    /// All tags as `(short name, referenced id)`.
    pub fn list_tags(&self) -> Result<Vec<(String, ObjectHash)>, GitError> {
        Ok(self
            .refs
            .list("refs/tags/")?
            .into_iter()
            .map(|(name, id)| {
                let short = name
                    .strip_prefix("refs/tags/")
                    .unwrap_or(&name)
                    .to_string();
                (short, id)
            })
            .collect())
    }

    /// Delete a tag ref (the tag object, if any, stays in the store).
    pub fn delete_tag(&self, name: &str) -> Result<(), GitError> {
        self.refs.delete(&format!("refs/tags/{name}"))
    }
}
