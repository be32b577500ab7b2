// [libs/domain/gather/src/script.rs]
/*!
 * =================================================================
 * APARATO: GATHER SCRIPT FORGE (V5.2 - FRAMING GUARANTEED)
 * CLASIFICACIÓN: DOMAIN GENERATORS (ESTRATO L2)
 * RESPONSABILIDAD: FORJADO DEL PROGRAMA SHELL DE RECOLECCIÓN PROFUNDA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. FRAMING GUARANTEED: Cada sección corre bajo timeout en subshell;
 *    un colector que colapsa emite su fallback vacío y el documento
 *    exterior sigue siendo JSON válido.
 * 2. SECRET MASKING: Las variables de entorno de contenedores cuyo
 *    nombre coincide con el patrón sensible se sustituyen por
 *    KEY=***MASKED*** antes de abandonar el host remoto.
 * 3. ZERO RESIDUE: El ejecutor borra el script tras la corrida; el
 *    programa no deja estado en el host auditado.
 * =================================================================
 */

/// Versión del contrato de documento que emite el script.
pub const GATHER_SCRIPT_VERSION: &str = "5.2.0";

/// Parámetros de forjado. Son la única entrada del generador.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherScriptOptions {
    /// Inspección profunda de contenedores (env, redes, volúmenes).
    pub include_docker_inspect: bool,
    /// Enumeración y análisis de certificados X.509.
    pub scan_certificates: bool,
    /// Listado de paquetes instalados (costoso en hosts grandes).
    pub enumerate_packages: bool,
    /// Plazo por colector individual, en segundos.
    pub collector_timeout_secs: u32,
    /// Tope de procesos reportados (ordenados por CPU).
    pub max_processes: u32,
}

impl Default for GatherScriptOptions {
    fn default() -> Self {
        Self {
            include_docker_inspect: true,
            scan_certificates: true,
            enumerate_packages: false,
            collector_timeout_secs: 20,
            max_processes: 400,
        }
    }
}

/**
 * Forja el programa de recolección. Determinista: mismas opciones,
 * mismos bytes.
 */
pub fn generate_gather_script(options: &GatherScriptOptions) -> String {
    let mut script = String::with_capacity(32 * 1024);

    script.push_str(&format!(
        "#!/bin/bash\n\
         # systemmap deep gather v{version}\n\
         export LC_ALL=C\n\
         export PATH=\"$PATH:/usr/sbin:/sbin:/usr/local/sbin\"\n\
         SECTION_TIMEOUT={timeout}\n\
         MAX_PROCESSES={max_processes}\n",
        version = GATHER_SCRIPT_VERSION,
        timeout = options.collector_timeout_secs,
        max_processes = options.max_processes,
    ));

    script.push_str(SHELL_RUNTIME);
    script.push_str(SECTION_OS);
    script.push_str(SECTION_STORAGE);
    script.push_str(SECTION_NETWORK);
    script.push_str(SECTION_PROCESSES);
    script.push_str(SECTION_SOCKETS);

    if options.include_docker_inspect {
        script.push_str(SECTION_DOCKER_DEEP);
    } else {
        script.push_str(SECTION_DOCKER_SHALLOW);
    }

    script.push_str(SECTION_WEBSERVER);
    script.push_str(SECTION_SYSTEMD);
    script.push_str(SECTION_CRON);

    if options.scan_certificates {
        script.push_str(SECTION_SSL);
    } else {
        script.push_str("collect_ssl_certificates() { printf '[]'; }\n");
    }

    script.push_str(SECTION_USERS);
    script.push_str(SECTION_FIREWALL);

    if options.enumerate_packages {
        script.push_str(SECTION_PACKAGES);
    } else {
        script.push_str("collect_installed_packages() { printf '[]'; }\n");
    }

    script.push_str(SECTION_KERNEL_SECURITY);
    script.push_str(SECTION_LOGS);
    script.push_str(MAIN_ASSEMBLY);

    script
}

// ------------------------------------------------------------------
// RUNTIME SHELL COMPARTIDO
// ------------------------------------------------------------------

const SHELL_RUNTIME: &str = r##"
# --- runtime helpers ---
json_escape() {
  sed -e 's/\\/\\\\/g' -e 's/"/\\"/g' -e 's/\t/\\t/g' -e 's/\r//g' \
    | awk 'NR>1{printf "\\n"} {printf "%s", $0} END{printf ""}'
}

je() { printf '%s' "$1" | json_escape; }

# Ejecuta un colector bajo timeout; ante colapso emite el fallback para
# preservar el framing del documento exterior.
run_section() {
  local section_name="$1" collector_fn="$2" fallback="$3" body
  body=$(timeout "${SECTION_TIMEOUT}" bash -c "$(declare -f json_escape je mask_env_line); $(declare -f "$collector_fn"); $collector_fn" 2>/dev/null)
  if [ -z "$body" ]; then body="$fallback"; fi
  printf '"%s": %s' "$section_name" "$body"
}

mask_env_line() {
  local env_line="$1" env_key="${1%%=*}"
  if printf '%s' "$env_key" | grep -qiE '(PASSWORD|SECRET|KEY|TOKEN|PASS|CREDENTIAL|AUTH)'; then
    printf '%s=***MASKED***' "$env_key"
  else
    printf '%s' "$env_line"
  fi
}
"##;

// ------------------------------------------------------------------
// SECCIONES
// ------------------------------------------------------------------

const SECTION_OS: &str = r##"
collect_os() {
  local host_name kernel_release os_pretty cpu_model cpu_cores memory_mb uptime_secs
  host_name=$(hostname 2>/dev/null)
  kernel_release=$(uname -r 2>/dev/null)
  os_pretty=$( (. /etc/os-release 2>/dev/null; printf '%s' "${PRETTY_NAME:-}") )
  [ -n "$os_pretty" ] || os_pretty=$(uname -s)
  cpu_model=$(awk -F': ' '/^model name/{print $2; exit}' /proc/cpuinfo 2>/dev/null)
  cpu_cores=$(nproc 2>/dev/null || echo 1)
  memory_mb=$(awk '/^MemTotal/{printf "%d", $2/1024}' /proc/meminfo 2>/dev/null)
  uptime_secs=$(awk '{printf "%d", $1}' /proc/uptime 2>/dev/null)
  printf '{"hostname":"%s","os_name":"%s","kernel":"%s","cpu_model":"%s","cpu_cores":%s,"memory_mb":%s,"uptime_secs":%s}' \
    "$(je "$host_name")" "$(je "$os_pretty")" "$(je "$kernel_release")" \
    "$(je "$cpu_model")" "${cpu_cores:-0}" "${memory_mb:-0}" "${uptime_secs:-0}"
}
"##;

const SECTION_STORAGE: &str = r##"
collect_disks() {
  local first=1
  printf '['
  lsblk -b -d -n -o NAME,TYPE,SIZE,MODEL 2>/dev/null | while read -r disk_name disk_type disk_size disk_model; do
    [ "$disk_type" = "disk" ] || continue
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"name":"%s","size_mb":%d,"model":"%s"}' \
      "$(je "$disk_name")" "$(( ${disk_size:-0} / 1048576 ))" "$(je "$disk_model")"
  done
  printf ']'
}

collect_lvm() {
  local first=1
  printf '['
  lvs --noheadings --separator '|' --units m --nosuffix -o vg_name,lv_name,lv_path,lv_size 2>/dev/null \
    | while IFS='|' read -r vg_name lv_name lv_path lv_size; do
      vg_name=$(printf '%s' "$vg_name" | tr -d ' ')
      [ -n "$vg_name" ] || continue
      [ "$first" = 1 ] || printf ','
      first=0
      printf '{"vg":"%s","lv":"%s","path":"%s","size_mb":%d}' \
        "$(je "$vg_name")" "$(je "$(printf '%s' "$lv_name" | tr -d ' ')")" \
        "$(je "$(printf '%s' "$lv_path" | tr -d ' ')")" "$(printf '%.0f' "${lv_size:-0}" 2>/dev/null || echo 0)"
    done
  printf ']'
}

collect_raid() {
  if [ -r /proc/mdstat ]; then
    printf '{"mdstat":"%s"}' "$(je "$(cat /proc/mdstat)")"
  else
    printf 'null'
  fi
}

collect_mounts() {
  local first=1
  printf '['
  df -PTm 2>/dev/null | tail -n +2 | while read -r device fs size_mb used_mb avail_mb use_pct mountpoint; do
    case "$fs" in tmpfs|devtmpfs|squashfs|overlay|proc|sysfs|cgroup*) continue ;; esac
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"device":"%s","mountpoint":"%s","fs":"%s","size_mb":%s,"used_mb":%s,"use_pct":%s}' \
      "$(je "$device")" "$(je "$mountpoint")" "$(je "$fs")" \
      "${size_mb:-0}" "${used_mb:-0}" "${use_pct%%%}"
  done
  printf ']'
}
"##;

const SECTION_NETWORK: &str = r##"
collect_interfaces() {
  local first=1 iface_path iface_name iface_mac iface_state iface_mtu iface_ip rx_bytes tx_bytes
  printf '['
  for iface_path in /sys/class/net/*; do
    iface_name=$(basename "$iface_path")
    [ "$iface_name" = "lo" ] && continue
    iface_mac=$(cat "$iface_path/address" 2>/dev/null)
    iface_state=$(cat "$iface_path/operstate" 2>/dev/null)
    iface_mtu=$(cat "$iface_path/mtu" 2>/dev/null)
    rx_bytes=$(cat "$iface_path/statistics/rx_bytes" 2>/dev/null)
    tx_bytes=$(cat "$iface_path/statistics/tx_bytes" 2>/dev/null)
    iface_ip=$(ip -o -4 addr show dev "$iface_name" 2>/dev/null | awk '{print $4; exit}' | cut -d/ -f1)
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"name":"%s","ip":"%s","mac":"%s","state":"%s","mtu":%s,"rx_bytes":%s,"tx_bytes":%s}' \
      "$(je "$iface_name")" "$(je "$iface_ip")" "$(je "$iface_mac")" \
      "$(je "$iface_state")" "${iface_mtu:-0}" "${rx_bytes:-0}" "${tx_bytes:-0}"
  done
  printf ']'
}

collect_routing() {
  local first=1 route_line
  printf '['
  ip route 2>/dev/null | while read -r route_line; do
    [ "$first" = 1 ] || printf ','
    first=0
    printf '"%s"' "$(je "$route_line")"
  done
  printf ']'
}

collect_etc_hosts() {
  local first=1 entry_ip entry_name
  printf '['
  awk '!/^[[:space:]]*#/ && NF >= 2 {for (i = 2; i <= NF; i++) print $1, $i}' /etc/hosts 2>/dev/null \
    | while read -r entry_ip entry_name; do
      [ "$first" = 1 ] || printf ','
      first=0
      printf '{"ip":"%s","hostname":"%s"}' "$(je "$entry_ip")" "$(je "$entry_name")"
    done
  printf ']'
}

collect_arp_table() {
  local first=1 neigh_ip neigh_dev neigh_mac neigh_state
  printf '['
  ip neigh show 2>/dev/null | while read -r neigh_ip _ neigh_dev _ neigh_mac neigh_state; do
    [ -n "$neigh_ip" ] || continue
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"ip":"%s","device":"%s","mac":"%s","state":"%s"}' \
      "$(je "$neigh_ip")" "$(je "$neigh_dev")" "$(je "$neigh_mac")" "$(je "$neigh_state")"
  done
  printf ']'
}
"##;

const SECTION_PROCESSES: &str = r##"
collect_processes() {
  local first=1 pid ppid puser pcpu prss pcomm pargs full_path cgroup_line fd_count mem_mb
  printf '['
  ps -eo pid=,ppid=,user=,pcpu=,rss=,comm=,args= --sort=-pcpu 2>/dev/null \
    | head -n "${MAX_PROCESSES}" \
    | while read -r pid ppid puser pcpu prss pcomm pargs; do
      [ -n "$pid" ] || continue
      full_path=$(readlink "/proc/$pid/exe" 2>/dev/null)
      cgroup_line=$(head -n 1 "/proc/$pid/cgroup" 2>/dev/null)
      fd_count=$(ls "/proc/$pid/fd" 2>/dev/null | wc -l)
      mem_mb=$(( ${prss:-0} / 1024 ))
      [ "$first" = 1 ] || printf ','
      first=0
      printf '{"pid":%s,"ppid":%s,"user":"%s","cpu_pct":%s,"mem_mb":%s,"command":"%s","full_path":"%s","args":"%s","cgroup":"%s","fd_count":%s}' \
        "$pid" "${ppid:-0}" "$(je "$puser")" "${pcpu:-0}" "$mem_mb" \
        "$(je "$pcomm")" "$(je "$full_path")" "$(je "$pargs")" \
        "$(je "$cgroup_line")" "${fd_count:-0}"
    done
  printf ']'
}
"##;

const SECTION_SOCKETS: &str = r##"
collect_listeners() {
  local first=1 proto state recvq sendq local_addr peer_addr process_blob bind_addr port proc_name proc_pid
  printf '['
  ss -tulpnH 2>/dev/null | while read -r proto state recvq sendq local_addr peer_addr process_blob; do
    bind_addr="${local_addr%:*}"
    port="${local_addr##*:}"
    case "$port" in ''|*[!0-9]*) continue ;; esac
    proc_name=$(printf '%s' "$process_blob" | sed -n 's/.*"\([^"]*\)".*/\1/p')
    proc_pid=$(printf '%s' "$process_blob" | sed -n 's/.*pid=\([0-9]*\).*/\1/p')
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"protocol":"%s","bind":"%s","port":%s,"state":"%s","process":"%s","pid":%s}' \
      "$(je "$proto")" "$(je "$bind_addr")" "$port" "$(je "$state")" \
      "$(je "$proc_name")" "${proc_pid:-null}"
  done
  printf ']'
}

collect_sockets() {
  local first=1 state recvq sendq local_addr peer_addr process_blob proc_name proc_pid
  printf '['
  ss -tnpH state established 2>/dev/null | while read -r recvq sendq local_addr peer_addr process_blob; do
    [ -n "$peer_addr" ] || continue
    proc_name=$(printf '%s' "$process_blob" | sed -n 's/.*"\([^"]*\)".*/\1/p')
    proc_pid=$(printf '%s' "$process_blob" | sed -n 's/.*pid=\([0-9]*\).*/\1/p')
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"local":"%s","peer":"%s","process":"%s","pid":%s}' \
      "$(je "$local_addr")" "$(je "$peer_addr")" "$(je "$proc_name")" "${proc_pid:-null}"
  done
  printf ']'
}
"##;

const SECTION_DOCKER_DEEP: &str = r##"
collect_docker_containers() {
  command -v docker >/dev/null 2>&1 || { printf '[]'; return; }
  local first=1 container_id container_env masked_env env_first
  printf '['
  docker ps -q 2>/dev/null | while read -r container_id; do
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"id":"%s"' "$(je "$container_id")"
    printf ',"name":"%s"' "$(je "$(docker inspect --format '{{.Name}}' "$container_id" 2>/dev/null | sed 's|^/||')")"
    printf ',"image":"%s"' "$(je "$(docker inspect --format '{{.Config.Image}}' "$container_id" 2>/dev/null)")"
    printf ',"state":"%s"' "$(je "$(docker inspect --format '{{.State.Status}}' "$container_id" 2>/dev/null)")"
    printf ',"ports":"%s"' "$(je "$(docker port "$container_id" 2>/dev/null | tr '\n' ';')")"
    printf ',"networks":"%s"' "$(je "$(docker inspect --format '{{range $k, $v := .NetworkSettings.Networks}}{{$k}}={{$v.IPAddress}};{{end}}' "$container_id" 2>/dev/null)")"
    printf ',"volumes":"%s"' "$(je "$(docker inspect --format '{{range .Mounts}}{{.Source}}:{{.Destination}};{{end}}' "$container_id" 2>/dev/null)")"
    printf ',"env":['
    env_first=1
    docker inspect --format '{{range .Config.Env}}{{println .}}{{end}}' "$container_id" 2>/dev/null \
      | while IFS= read -r container_env; do
        [ -n "$container_env" ] || continue
        masked_env=$(mask_env_line "$container_env")
        [ "$env_first" = 1 ] || printf ','
        env_first=0
        printf '"%s"' "$(je "$masked_env")"
      done
    printf ']}'
  done
  printf ']'
}

collect_docker_networks() {
  command -v docker >/dev/null 2>&1 || { printf '[]'; return; }
  local first=1 network_name gateway member_first
  printf '['
  docker network ls --format '{{.Name}}' 2>/dev/null | while read -r network_name; do
    case "$network_name" in none|host) continue ;; esac
    gateway=$(docker network inspect --format '{{range .IPAM.Config}}{{.Gateway}}{{end}}' "$network_name" 2>/dev/null)
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"name":"%s","gateway":"%s","containers":[' "$(je "$network_name")" "$(je "$gateway")"
    member_first=1
    docker network inspect --format '{{range .Containers}}{{.Name}}|{{.IPv4Address}}{{println}}{{end}}' "$network_name" 2>/dev/null \
      | while IFS='|' read -r member_name member_ip; do
        [ -n "$member_name" ] || continue
        [ "$member_first" = 1 ] || printf ','
        member_first=0
        printf '{"name":"%s","ip":"%s"}' "$(je "$member_name")" "$(je "${member_ip%%/*}")"
      done
    printf ']}'
  done
  printf ']'
}
"##;

const SECTION_DOCKER_SHALLOW: &str = r##"
collect_docker_containers() {
  command -v docker >/dev/null 2>&1 || { printf '[]'; return; }
  local first=1 container_id container_name container_image container_state
  printf '['
  docker ps --format '{{.ID}}|{{.Names}}|{{.Image}}|{{.State}}' 2>/dev/null \
    | while IFS='|' read -r container_id container_name container_image container_state; do
      [ "$first" = 1 ] || printf ','
      first=0
      printf '{"id":"%s","name":"%s","image":"%s","state":"%s","ports":"","networks":"","volumes":"","env":[]}' \
        "$(je "$container_id")" "$(je "$container_name")" \
        "$(je "$container_image")" "$(je "$container_state")"
    done
  printf ']'
}

collect_docker_networks() { printf '[]'; }
"##;

const SECTION_WEBSERVER: &str = r##"
collect_webserver_configs() {
  local first=1 config_path server_kind
  printf '['
  {
    for config_path in /etc/nginx/nginx.conf /etc/nginx/conf.d/*.conf /etc/nginx/sites-enabled/*; do
      [ -f "$config_path" ] && printf 'nginx %s\n' "$config_path"
    done
    for config_path in /etc/apache2/sites-enabled/* /etc/httpd/conf.d/*.conf; do
      [ -f "$config_path" ] && printf 'apache %s\n' "$config_path"
    done
    [ -f /etc/haproxy/haproxy.cfg ] && printf 'haproxy /etc/haproxy/haproxy.cfg\n'
  } | head -n 40 | while read -r server_kind config_path; do
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"server":"%s","path":"%s","content":"%s"}' \
      "$(je "$server_kind")" "$(je "$config_path")" \
      "$(je "$(head -c 65536 "$config_path" 2>/dev/null)")"
  done
  printf ']'
}
"##;

const SECTION_SYSTEMD: &str = r##"
collect_systemd_units() {
  command -v systemctl >/dev/null 2>&1 || { printf '[]'; return; }
  local first=1 unit_name unit_load unit_active unit_sub unit_props main_pid memory_bytes cpu_nsec enabled_state memory_mb cpu_secs
  printf '['
  systemctl list-units --type=service --all --no-legend --plain 2>/dev/null \
    | awk '{print $1, $3, $4}' | head -n 300 \
    | while read -r unit_name unit_active unit_sub; do
      case "$unit_active" in active|failed) ;; *) continue ;; esac
      unit_props=$(systemctl show "$unit_name" -p MainPID,MemoryCurrent,CPUUsageNSec,UnitFileState 2>/dev/null)
      main_pid=$(printf '%s' "$unit_props" | sed -n 's/^MainPID=//p')
      memory_bytes=$(printf '%s' "$unit_props" | sed -n 's/^MemoryCurrent=//p')
      cpu_nsec=$(printf '%s' "$unit_props" | sed -n 's/^CPUUsageNSec=//p')
      enabled_state=$(printf '%s' "$unit_props" | sed -n 's/^UnitFileState=//p')
      case "$memory_bytes" in ''|*[!0-9]*) memory_bytes=0 ;; esac
      case "$cpu_nsec" in ''|*[!0-9]*) cpu_nsec=0 ;; esac
      memory_mb=$(( memory_bytes / 1048576 ))
      cpu_secs=$(( cpu_nsec / 1000000000 ))
      [ "$first" = 1 ] || printf ','
      first=0
      printf '{"name":"%s","type":"service","active_state":"%s","sub_state":"%s","main_pid":%s,"memory_mb":%s,"cpu_sec":%s,"enabled":%s}' \
        "$(je "$unit_name")" "$(je "$unit_active")" "$(je "$unit_sub")" \
        "${main_pid:-0}" "$memory_mb" "$cpu_secs" \
        "$([ "$enabled_state" = "enabled" ] && printf 'true' || printf 'false')"
    done
  printf ']'
}
"##;

const SECTION_CRON: &str = r##"
collect_cron_jobs() {
  local first=1 cron_user schedule_and_command cron_source
  printf '['
  {
    while IFS=: read -r cron_user _; do
      crontab -l -u "$cron_user" 2>/dev/null | awk -v u="$cron_user" \
        '!/^[[:space:]]*(#|$)/ {print "user_crontab|" u "|" $0}'
    done < /etc/passwd
    awk '!/^[[:space:]]*(#|$)/ && NF > 6 {user=$6; $6=""; print "/etc/crontab|" user "|" $0}' /etc/crontab 2>/dev/null
    for cron_source in /etc/cron.d/*; do
      [ -f "$cron_source" ] || continue
      awk -v src="$cron_source" '!/^[[:space:]]*(#|$)/ && NF > 6 {user=$6; print src "|" user "|" $0}' "$cron_source" 2>/dev/null
    done
  } | head -n 200 | while IFS='|' read -r cron_source cron_user schedule_and_command; do
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"user":"%s","schedule":"%s","command":"%s","source":"%s"}' \
      "$(je "$cron_user")" \
      "$(je "$(printf '%s' "$schedule_and_command" | awk '{print $1, $2, $3, $4, $5}')")" \
      "$(je "$(printf '%s' "$schedule_and_command" | cut -d' ' -f6-)")" \
      "$(je "$cron_source")"
  done
  printf ']'
}
"##;

const SECTION_SSL: &str = r##"
collect_ssl_certificates() {
  command -v openssl >/dev/null 2>&1 || { printf '[]'; return; }
  local first=1 cert_path cert_subject cert_issuer cert_start cert_end end_epoch now_epoch days_left is_expired san_domains
  printf '['
  find /etc/ssl/certs /etc/letsencrypt/live /etc/pki/tls/certs /etc/nginx /etc/apache2 \
      -maxdepth 3 \( -name '*.pem' -o -name '*.crt' \) -type f 2>/dev/null \
    | head -n 50 | while read -r cert_path; do
      cert_subject=$(openssl x509 -in "$cert_path" -noout -subject 2>/dev/null | sed 's/^subject=//')
      [ -n "$cert_subject" ] || continue
      cert_issuer=$(openssl x509 -in "$cert_path" -noout -issuer 2>/dev/null | sed 's/^issuer=//')
      cert_start=$(openssl x509 -in "$cert_path" -noout -startdate 2>/dev/null | cut -d= -f2)
      cert_end=$(openssl x509 -in "$cert_path" -noout -enddate 2>/dev/null | cut -d= -f2)
      san_domains=$(openssl x509 -in "$cert_path" -noout -ext subjectAltName 2>/dev/null \
        | tr ',' '\n' | sed -n 's/.*DNS://p' | tr '\n' ',' | sed 's/,$//')
      end_epoch=$(date -d "$cert_end" +%s 2>/dev/null || echo 0)
      now_epoch=$(date +%s)
      days_left=$(( (end_epoch - now_epoch) / 86400 ))
      if [ "$days_left" -le 0 ]; then is_expired=true; else is_expired=false; fi
      [ "$first" = 1 ] || printf ','
      first=0
      printf '{"path":"%s","subject":"%s","issuer":"%s","valid_from":"%s","valid_to":"%s","days_left":%s,"is_expired":%s,"san_domains":"%s"}' \
        "$(je "$cert_path")" "$(je "$cert_subject")" "$(je "$cert_issuer")" \
        "$(je "$cert_start")" "$(je "$cert_end")" "$days_left" "$is_expired" \
        "$(je "$san_domains")"
    done
  printf ']'
}
"##;

const SECTION_USERS: &str = r##"
collect_user_accounts() {
  local first=1 account_name account_uid account_gid account_home account_shell has_login account_groups
  printf '['
  while IFS=: read -r account_name _ account_uid account_gid _ account_home account_shell; do
    case "$account_shell" in */nologin|*/false|'') has_login=false ;; *) has_login=true ;; esac
    account_groups=$(id -Gn "$account_name" 2>/dev/null | tr ' ' ',')
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"username":"%s","uid":%s,"gid":%s,"shell":"%s","home_dir":"%s","has_login":%s,"groups":"%s"}' \
      "$(je "$account_name")" "$account_uid" "$account_gid" \
      "$(je "$account_shell")" "$(je "$account_home")" "$has_login" \
      "$(je "$account_groups")"
  done < /etc/passwd
  printf ']'
}
"##;

const SECTION_FIREWALL: &str = r##"
collect_firewall() {
  local rules_blob
  if command -v nft >/dev/null 2>&1; then
    rules_blob=$(nft list ruleset 2>/dev/null | head -c 32768)
    printf '{"engine":"nftables","rules":"%s"}' "$(je "$rules_blob")"
  elif command -v iptables >/dev/null 2>&1; then
    rules_blob=$(iptables -S 2>/dev/null | head -c 32768)
    printf '{"engine":"iptables","rules":"%s"}' "$(je "$rules_blob")"
  else
    printf 'null'
  fi
}
"##;

const SECTION_PACKAGES: &str = r##"
collect_installed_packages() {
  local first=1 package_name package_version
  printf '['
  {
    dpkg-query -W -f '${Package}|${Version}\n' 2>/dev/null \
      || rpm -qa --qf '%{NAME}|%{VERSION}-%{RELEASE}\n' 2>/dev/null
  } | head -n 3000 | while IFS='|' read -r package_name package_version; do
    [ -n "$package_name" ] || continue
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"name":"%s","version":"%s"}' "$(je "$package_name")" "$(je "$package_version")"
  done
  printf ']'
}
"##;

const SECTION_KERNEL_SECURITY: &str = r##"
collect_kernel() {
  local kernel_full modules_list swappiness somaxconn
  kernel_full=$(uname -a 2>/dev/null)
  modules_list=$(lsmod 2>/dev/null | tail -n +2 | awk '{print $1}' | head -n 60 | tr '\n' ',' | sed 's/,$//')
  swappiness=$(cat /proc/sys/vm/swappiness 2>/dev/null)
  somaxconn=$(cat /proc/sys/net/core/somaxconn 2>/dev/null)
  printf '{"uname":"%s","modules":"%s","vm_swappiness":%s,"net_somaxconn":%s}' \
    "$(je "$kernel_full")" "$(je "$modules_list")" "${swappiness:-null}" "${somaxconn:-null}"
}

collect_security() {
  local permit_root password_auth selinux_mode sudoers_entries
  permit_root=$(sshd -T 2>/dev/null | awk '/^permitrootlogin/{print $2}')
  [ -n "$permit_root" ] || permit_root=$(awk '/^PermitRootLogin/{print $2; exit}' /etc/ssh/sshd_config 2>/dev/null)
  password_auth=$(awk '/^PasswordAuthentication/{print $2; exit}' /etc/ssh/sshd_config 2>/dev/null)
  selinux_mode=$(getenforce 2>/dev/null)
  sudoers_entries=$(grep -cvE '^[[:space:]]*(#|$)' /etc/sudoers 2>/dev/null)
  printf '{"ssh_permit_root_login":"%s","ssh_password_auth":"%s","selinux":"%s","sudoers_entries":%s}' \
    "$(je "$permit_root")" "$(je "$password_auth")" "$(je "$selinux_mode")" "${sudoers_entries:-0}"
}
"##;

const SECTION_LOGS: &str = r##"
collect_logs() {
  local first=1 log_line log_file
  printf '['
  {
    journalctl -p err --since "24 hours ago" --no-pager -q -n 200 2>/dev/null \
      | awk '{print "journal|err|" $0}'
    for log_file in /var/log/error*.log /var/log/nginx/error.log /var/log/mysql/error.log /var/log/httpd/error_log; do
      [ -f "$log_file" ] || continue
      # Solo la ventana deslizante de 24 horas.
      find "$log_file" -mtime -1 2>/dev/null | grep -q . || continue
      tail -n 50 "$log_file" 2>/dev/null | grep -iE 'error|fail|crit' \
        | awk -v f="$log_file" '{print f "|err|" $0}'
    done
  } | head -n 400 | while IFS='|' read -r log_file log_severity log_line; do
    [ "$first" = 1 ] || printf ','
    first=0
    printf '{"source":"%s","severity":"%s","line":"%s"}' \
      "$(je "$log_file")" "$(je "$log_severity")" "$(je "$log_line")"
  done
  printf ']'
}
"##;

// ------------------------------------------------------------------
// ENSAMBLAJE FINAL
// ------------------------------------------------------------------

const MAIN_ASSEMBLY: &str = r##"
# --- document assembly ---
START_EPOCH_MS=$(date +%s%3N)

printf '{\n'
printf '"_meta": {"version":"%s","collector_host":"%s","start_epoch_ms":%s},\n' \
  "$(grep -m1 '^# systemmap deep gather v' "$0" | sed 's/.*v//')" \
  "$(je "$(hostname 2>/dev/null)")" "$START_EPOCH_MS"

run_section "os" collect_os 'null'; printf ',\n'
run_section "disks" collect_disks '[]'; printf ',\n'
run_section "lvm" collect_lvm '[]'; printf ',\n'
run_section "raid" collect_raid 'null'; printf ',\n'
run_section "mounts" collect_mounts '[]'; printf ',\n'
run_section "interfaces" collect_interfaces '[]'; printf ',\n'
run_section "routing" collect_routing '[]'; printf ',\n'
run_section "etc_hosts" collect_etc_hosts '[]'; printf ',\n'
run_section "arp_table" collect_arp_table '[]'; printf ',\n'
run_section "processes" collect_processes '[]'; printf ',\n'
run_section "listeners" collect_listeners '[]'; printf ',\n'
run_section "sockets" collect_sockets '[]'; printf ',\n'
run_section "docker_containers" collect_docker_containers '[]'; printf ',\n'
run_section "docker_networks" collect_docker_networks '[]'; printf ',\n'
run_section "webserver_configs" collect_webserver_configs '[]'; printf ',\n'
run_section "systemd_units" collect_systemd_units '[]'; printf ',\n'
run_section "cron_jobs" collect_cron_jobs '[]'; printf ',\n'
run_section "ssl_certificates" collect_ssl_certificates '[]'; printf ',\n'
run_section "user_accounts" collect_user_accounts '[]'; printf ',\n'
run_section "firewall" collect_firewall 'null'; printf ',\n'
run_section "installed_packages" collect_installed_packages '[]'; printf ',\n'
run_section "kernel" collect_kernel 'null'; printf ',\n'
run_section "security" collect_security 'null'; printf ',\n'
run_section "logs" collect_logs '[]'; printf ',\n'

printf '"_meta_end": {"end_epoch_ms":%s}\n' "$(date +%s%3N)"
printf '}\n'
"##;

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * Misma entrada, mismos bytes: generaciones repetidas deben ser
     * idénticas carácter a carácter.
     */
    #[test]
    fn certify_forge_determinism() {
        let options = GatherScriptOptions::default();
        let first_forge = generate_gather_script(&options);
        let second_forge = generate_gather_script(&options);
        assert_eq!(first_forge, second_forge);
    }

    #[test]
    fn certify_all_sections_present() {
        let script = generate_gather_script(&GatherScriptOptions::default());

        for section_name in [
            "os", "disks", "lvm", "raid", "mounts", "interfaces", "routing",
            "etc_hosts", "arp_table", "processes", "listeners", "sockets",
            "docker_containers", "docker_networks", "webserver_configs",
            "systemd_units", "cron_jobs", "ssl_certificates", "user_accounts",
            "firewall", "installed_packages", "kernel", "security", "logs",
        ] {
            assert!(
                script.contains(&format!("run_section \"{}\"", section_name)),
                "missing section framing for {}",
                section_name
            );
        }

        assert!(script.contains("\"_meta\""));
        assert!(script.contains("\"_meta_end\""));
    }

    /**
     * El patrón de enmascaramiento debe cubrir todas las familias de
     * llaves sensibles y reemplazar por el marcador fijo.
     */
    #[test]
    fn certify_masking_pattern() {
        let script = generate_gather_script(&GatherScriptOptions::default());
        assert!(script.contains("(PASSWORD|SECRET|KEY|TOKEN|PASS|CREDENTIAL|AUTH)"));
        assert!(script.contains("***MASKED***"));

        let mask_regex =
            regex::Regex::new(r"(?i)(PASSWORD|SECRET|KEY|TOKEN|PASS|CREDENTIAL|AUTH)").unwrap();
        for sensitive_key in [
            "DATABASE_PASSWORD", "api_secret", "SSH_KEY", "AUTH_TOKEN",
            "DbPass", "AWS_CREDENTIALS", "OAUTH_CLIENT",
        ] {
            assert!(mask_regex.is_match(sensitive_key), "{} must match", sensitive_key);
        }
        assert!(!mask_regex.is_match("DATABASE_URL"));
    }

    #[test]
    fn certify_feature_gates() {
        let gated_off = generate_gather_script(&GatherScriptOptions {
            include_docker_inspect: false,
            scan_certificates: false,
            enumerate_packages: false,
            ..GatherScriptOptions::default()
        });

        assert!(gated_off.contains("collect_ssl_certificates() { printf '[]'; }"));
        assert!(gated_off.contains("collect_installed_packages() { printf '[]'; }"));
        assert!(!gated_off.contains("docker network inspect"));

        let gated_on = generate_gather_script(&GatherScriptOptions::default());
        assert!(gated_on.contains("docker network inspect"));
        assert!(gated_on.contains("openssl x509"));
    }

    #[test]
    fn certify_parameter_interpolation() {
        let script = generate_gather_script(&GatherScriptOptions {
            collector_timeout_secs: 45,
            max_processes: 123,
            ..GatherScriptOptions::default()
        });
        assert!(script.contains("SECTION_TIMEOUT=45"));
        assert!(script.contains("MAX_PROCESSES=123"));
    }

    /**
     * El certificado expira cuando days_left <= 0; la rama shell debe
     * reflejar exactamente ese umbral.
     */
    #[test]
    fn certify_expiry_threshold_in_script() {
        let script = generate_gather_script(&GatherScriptOptions::default());
        assert!(script.contains(r#"if [ "$days_left" -le 0 ]; then is_expired=true"#));
    }
}
