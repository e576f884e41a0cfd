use std::collections::HashMap;

use actix::{Actor, Addr, Arbiter, Context};
use tracing::info;

use crate::profile::{ProfileActor, ProfileDeps};

pub mod handlers;
pub mod messages;

/// profile id 로 sample 을 라우팅하고 처음 보는 프로필의 actor 를 띄운다.
pub struct ProfileRegistry {
    profiles: HashMap<String, Addr<ProfileActor>>,
    arbiters: Vec<Arbiter>,
    next_arbiter: usize,
    deps: ProfileDeps,
}

impl ProfileRegistry {
    /// `worker_arbiters` 가 0 이면 모든 프로필을 현재 arbiter 에서 돌린다.
    pub fn new(deps: ProfileDeps, worker_arbiters: usize) -> Self {
        Self {
            profiles: HashMap::new(),
            arbiters: (0..worker_arbiters).map(|_| Arbiter::new()).collect(),
            next_arbiter: 0,
            deps,
        }
    }

    fn profile_addr(&mut self, profile_id: &str) -> Addr<ProfileActor> {
        if let Some(addr) = self.profiles.get(profile_id) {
            if addr.connected() {
                return addr.clone();
            }
        }

        let id = profile_id.to_string();
        let deps = self.deps.clone();
        let addr = if self.arbiters.is_empty() {
            ProfileActor::new(id, deps).start()
        } else {
            let arbiter = &self.arbiters[self.next_arbiter % self.arbiters.len()];
            self.next_arbiter = self.next_arbiter.wrapping_add(1);
            ProfileActor::start_in_arbiter(&arbiter.handle(), move |_ctx| {
                ProfileActor::new(id, deps)
            })
        };

        info!("Spawned profile actor for {}", profile_id);
        self.profiles.insert(profile_id.to_string(), addr.clone());
        addr
    }
}

impl Actor for ProfileRegistry {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!(
            "ProfileRegistry started with {} worker arbiters",
            self.arbiters.len()
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        for arbiter in &self.arbiters {
            arbiter.stop();
        }
        info!("ProfileRegistry stopped");
    }
}
