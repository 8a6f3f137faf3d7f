use async_trait::async_trait;

use crate::application::repos::{RepoError, UsersRepo, VotesRepo};
use crate::domain::entities::{UserRecord, VoteRecord};
use crate::domain::types::{BLOG_VOTE_TARGET, UserId};

use super::MemoryBlogStore;

#[async_trait]
impl UsersRepo for MemoryBlogStore {
    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<UserRecord>, RepoError> {
        let state = self.enter("find_users", ids)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl VotesRepo for MemoryBlogStore {
    /// Only blog votes are kept; other targets have none.
    async fn find_votes(
        &self,
        target: &str,
        target_ids: &[u64],
        voter_id: UserId,
    ) -> Result<Vec<VoteRecord>, RepoError> {
        let state = self.enter("find_votes", target_ids)?;
        if target != BLOG_VOTE_TARGET {
            return Ok(Vec::new());
        }
        Ok(state
            .votes
            .iter()
            .filter(|vote| vote.voter_id == voter_id && target_ids.contains(&vote.target_id))
            .cloned()
            .collect())
    }
}
