//! Role election from the two link identities.
//!
//! Both nodes run the same comparison on the same pair of identities, so
//! they reach complementary roles without exchanging any further message.

use crate::core::{Error, NodeIdentity, Result, Role};

/// Decides the local role: the numerically smaller identity is Master.
pub fn elect(local: &NodeIdentity, peer: &NodeIdentity) -> Result<Role> {
    if local == peer {
        return Err(Error::election(format!(
            "peer identity {peer} equals the local identity"
        )));
    }

    if local < peer {
        Ok(Role::Master)
    } else {
        Ok(Role::Slave)
    }
}
