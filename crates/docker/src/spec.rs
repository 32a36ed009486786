// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `docker run` argument construction.

use kr_core::NumaTopology;

/// Declarative description of a container to run.
///
/// `to_args()` yields the argv tail after `docker` (starting with `run`).
#[derive(Debug, Clone)]
pub struct RunSpec {
    image: String,
    name: String,
    command: Vec<String>,
    detach: bool,
    restart: Option<String>,
    cpus: Option<u32>,
    memory_bytes: Option<u64>,
    cpuset_cpus: Option<String>,
    cpuset_mems: Option<String>,
    gpu_ids: Vec<u32>,
    mounts: Vec<String>,
    env: Vec<(String, String)>,
    working_dir: Option<String>,
    privileged: bool,
    publish: Vec<String>,
    labels: Vec<(String, String)>,
    network: Option<String>,
}

impl RunSpec {
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            command: Vec::new(),
            detach: false,
            restart: None,
            cpus: None,
            memory_bytes: None,
            cpuset_cpus: None,
            cpuset_mems: None,
            gpu_ids: Vec::new(),
            mounts: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            privileged: false,
            publish: Vec::new(),
            labels: Vec::new(),
            network: None,
        }
    }

    pub fn command(mut self, command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Wrap a shell script as the container command: `/bin/sh -c <script>`.
    pub fn shell_command(self, script: impl Into<String>) -> Self {
        self.command(["/bin/sh".to_string(), "-c".to_string(), script.into()])
    }

    pub fn detach(mut self) -> Self {
        self.detach = true;
        self
    }

    pub fn restart(mut self, policy: impl Into<String>) -> Self {
        self.restart = Some(policy.into());
        self
    }

    pub fn cpus(mut self, cores: u32) -> Self {
        if cores > 0 {
            self.cpus = Some(cores);
        }
        self
    }

    pub fn memory_bytes(mut self, bytes: Option<u64>) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Pin CPU execution and memory allocation to one NUMA node, when the
    /// node appears in the detected topology.
    pub fn pin_numa(mut self, numa_id: Option<u32>, topology: Option<&NumaTopology>) -> Self {
        let (Some(numa_id), Some(topology)) = (numa_id, topology) else {
            return self;
        };
        let Some(node) = topology.get(&numa_id) else {
            tracing::warn!(numa_id, "target NUMA node not in detected topology, not pinning");
            return self;
        };
        let cores: Vec<String> = node.cores.iter().map(|c| c.to_string()).collect();
        self.cpuset_cpus = Some(cores.join(","));
        self.cpuset_mems = Some(numa_id.to_string());
        self
    }

    pub fn gpus(mut self, ids: &[u32]) -> Self {
        self.gpu_ids = ids.to_vec();
        self
    }

    /// Bind mount in `host:container[:options]` form.
    pub fn mount(mut self, spec: impl Into<String>) -> Self {
        self.mounts.push(spec.into());
        self
    }

    pub fn mounts(mut self, specs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.mounts.extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(
        mut self,
        vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.env.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        let dir = dir.into();
        if !dir.is_empty() {
            self.working_dir = Some(dir);
        }
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Publish a container port: `"0:22"` asks for an ephemeral host port.
    pub fn publish(mut self, mapping: impl Into<String>) -> Self {
        self.publish.push(mapping.into());
        self
    }

    pub fn labels(mut self, labels: impl IntoIterator<Item = (String, String)>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn network(mut self, mode: impl Into<String>) -> Self {
        self.network = Some(mode.into());
        self
    }

    pub fn container_name(&self) -> &str {
        &self.name
    }

    /// Build the `docker` argv for this spec (starting with `run`).
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["run".into(), "--name".into(), self.name.clone()];

        if self.detach {
            args.push("-d".into());
        }
        if let Some(policy) = &self.restart {
            args.extend(["--restart".into(), policy.clone()]);
        }
        if self.privileged {
            args.push("--privileged".into());
        } else {
            // SYS_NICE lets in-container workloads manage their own priorities.
            args.extend(["--cap-add".into(), "SYS_NICE".into()]);
        }
        if let Some(cpus) = self.cpus {
            args.extend(["--cpus".into(), cpus.to_string()]);
        }
        if let Some(memory) = self.memory_bytes {
            args.extend(["--memory".into(), memory.to_string()]);
        }
        if let Some(cpuset) = &self.cpuset_cpus {
            args.extend(["--cpuset-cpus".into(), cpuset.clone()]);
        }
        if let Some(mems) = &self.cpuset_mems {
            args.extend(["--cpuset-mems".into(), mems.clone()]);
        }
        if !self.gpu_ids.is_empty() {
            let ids: Vec<String> = self.gpu_ids.iter().map(|g| g.to_string()).collect();
            args.extend(["--gpus".into(), format!("\"device={}\"", ids.join(","))]);
        }
        for mount in &self.mounts {
            match parse_mount(mount) {
                Some(arg) => args.extend(["--mount".into(), arg]),
                None => tracing::warn!(mount, "invalid mount format, skipping"),
            }
        }
        for (key, value) in &self.env {
            args.extend(["-e".into(), format!("{}={}", key, value)]);
        }
        if let Some(dir) = &self.working_dir {
            args.extend(["--workdir".into(), dir.clone()]);
        }
        for mapping in &self.publish {
            args.extend(["-p".into(), mapping.clone()]);
        }
        for (key, value) in &self.labels {
            args.extend(["--label".into(), format!("{}={}", key, value)]);
        }
        if let Some(network) = &self.network {
            args.extend(["--network".into(), network.clone()]);
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Turn `host:container[:options,...]` into a `--mount` argument.
fn parse_mount(spec: &str) -> Option<String> {
    let mut parts = spec.splitn(3, ':');
    let host = parts.next().filter(|s| !s.is_empty())?;
    let container = parts.next().filter(|s| !s.is_empty())?;
    let options = parts.next();
    let suffix = match options {
        Some(opts) if !opts.is_empty() => format!(",{}", opts),
        _ => String::new(),
    };
    Some(format!("type=bind,source={},target={}{}", host, container, suffix))
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
