//! Read access to the live member set

use tracing::warn;

use crate::member::Member;
use crate::meta::NodeRole;

/// A view of the live members of the cluster.
///
/// The snapshot is eventually consistent. Two calls may disagree while
/// gossip converges.
pub trait MemberView: Send + Sync {
    /// Current snapshot of live nodes, including the local one
    fn members(&self) -> Vec<Member>;

    /// Live nodes advertising `role`
    fn filter_by_role(&self, role: NodeRole) -> Vec<Member> {
        filter_by_role(self.members(), role)
    }

    /// Live nodes matching `predicate`
    fn filter_by_predicate(&self, predicate: &dyn Fn(&Member) -> bool) -> Vec<Member> {
        self.members().into_iter().filter(|m| predicate(m)).collect()
    }
}

/// Keep the members whose decoded role equals `role`.
///
/// A member with malformed metadata is left out and logged; it never
/// counts as any role.
pub fn filter_by_role(members: Vec<Member>, role: NodeRole) -> Vec<Member> {
    members
        .into_iter()
        .filter(|member| match member.meta() {
            Ok(meta) => meta.role == role,
            Err(e) => {
                warn!(node = %member.name, "Skipping member with unreadable metadata: {}", e);
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::NodeMeta;

    struct Fixed(Vec<Member>);

    impl MemberView for Fixed {
        fn members(&self) -> Vec<Member> {
            self.0.clone()
        }
    }

    fn member(name: &str, meta: NodeMeta) -> Member {
        Member::new(name, "10.0.0.1:7946".parse().unwrap(), meta.encode().unwrap())
    }

    #[test]
    fn test_filter_by_role() {
        let view = Fixed(vec![
            member("kitchen", NodeMeta::music(5000, 7070)),
            member("mgmt-1", NodeMeta::management(7070, 7080)),
            member("porch", NodeMeta::music(5000, 7070)),
            Member::new("broken", "10.0.0.9:7946".parse().unwrap(), vec![1, 2, 3]),
        ]);

        let names: Vec<_> = view
            .filter_by_role(NodeRole::Music)
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["kitchen", "porch"]);

        assert_eq!(view.filter_by_role(NodeRole::Management).len(), 1);
        assert!(view.filter_by_role(NodeRole::Frontend).is_empty());
    }

    #[test]
    fn test_filter_by_predicate() {
        let view = Fixed(vec![
            member("kitchen", NodeMeta::music(5000, 7070)),
            member("porch", NodeMeta::music(5001, 7071)),
        ]);

        let found = view.filter_by_predicate(&|m| m.name == "porch");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].meta().unwrap().rtsp_port, 5001);

        assert!(view.filter_by_predicate(&|_| false).is_empty());
    }
}
